#![allow(dead_code)]

use std::sync::Arc;

use strata::{
    AttachmentInfo, AttachmentUsage, BindPoint, BindingScope, Buffer, BufferDesc, BufferUsage,
    ClearValue, Device, DeviceConfig, Format, Framebuffer, FramebufferSurface, GPUError,
    MaterialDesc, MaterialElement, MemoryHints, NullBackend, NullCall, RenderPass, Renderer,
    Shader, Texture, TextureInfo, TextureUsage,
};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Renderer over a [`NullBackend`], with helpers for creating the resources tests record with.
pub struct TestRenderer {
    renderer: Renderer<NullBackend>,
    device: Arc<Device<NullBackend>>,
}

impl TestRenderer {
    pub fn new() -> Result<Self, GPUError> {
        Self::with_config(DeviceConfig::default())
    }

    pub fn with_config(config: DeviceConfig) -> Result<Self, GPUError> {
        init_logging();
        let device = Device::new(NullBackend::new(), config)?;
        Ok(Self {
            renderer: Renderer::new(Arc::clone(&device)),
            device,
        })
    }

    pub fn device(&self) -> Arc<Device<NullBackend>> {
        Arc::clone(&self.device)
    }

    pub fn backend(&self) -> &NullBackend {
        self.device.backend()
    }

    pub fn count<F>(&self, pred: F) -> usize
    where
        F: Fn(&NullCall) -> bool,
    {
        self.backend().count_calls(pred)
    }

    pub fn buffer(&self, size: u64, usage: BufferUsage) -> Arc<Buffer> {
        let native = self.backend().create_buffer().unwrap();
        Buffer::new(
            native,
            BufferDesc {
                size,
                usage,
                ..Default::default()
            },
        )
    }

    /// Host-visible buffer whose read maps wait for the GPU.
    pub fn readable_buffer(&self, size: u64, usage: BufferUsage) -> Arc<Buffer> {
        let native = self.backend().create_buffer().unwrap();
        Buffer::new(
            native,
            BufferDesc {
                size,
                usage,
                memory: MemoryHints::READ | MemoryHints::SYNCHRONIZE,
                host_visible: true,
            },
        )
    }

    pub fn texture(&self, info: TextureInfo, usage: TextureUsage) -> Arc<Texture> {
        let backend = self.backend();
        Texture::new(
            backend.create_image().unwrap(),
            backend.create_image_view().unwrap(),
            info,
            usage,
        )
    }

    pub fn offscreen(&self, info: TextureInfo, readback: bool) -> Arc<Texture> {
        let backend = self.backend();
        let host = readback.then(|| backend.create_image().unwrap());
        Texture::offscreen(
            backend.create_image().unwrap(),
            backend.create_image_view().unwrap(),
            info,
            TextureUsage::TEXTURE,
            host,
        )
    }

    /// Single color attachment pass over a fresh offscreen.
    pub fn color_target(
        &self,
        width: u32,
        height: u32,
        subpasses: u32,
        readback: bool,
    ) -> ColorTarget {
        let info = TextureInfo {
            width,
            height,
            ..Default::default()
        };
        let texture = self.offscreen(info, readback);
        let pass = RenderPass::new(
            self.backend().create_render_pass().unwrap(),
            vec![AttachmentInfo {
                format: info.format,
                usage: AttachmentUsage::CLEAR | AttachmentUsage::KEEP_AFTER,
                samples: 1,
            }],
            subpasses,
        );
        let framebuffer = Framebuffer::new(
            self.backend().create_framebuffer().unwrap(),
            vec![FramebufferSurface::offscreen(Arc::clone(&texture))],
            width,
            height,
            1,
        );
        ColorTarget {
            texture,
            pass,
            framebuffer,
        }
    }

    /// Shader over `elements`, with a binding layout for every scope they use.
    pub fn shader(&self, elements: Vec<MaterialElement>, point: BindPoint) -> Arc<Shader> {
        let backend = self.backend();
        let mut desc = MaterialDesc::new(elements);
        for scope in [
            BindingScope::Material,
            BindingScope::Global,
            BindingScope::Instance,
        ] {
            if desc.elements.iter().any(|e| e.scope == scope) {
                desc = desc.with_layout(scope, backend.create_binding_layout().unwrap());
            }
        }
        Shader::new(
            backend.create_pipeline().unwrap(),
            backend.create_pipeline_layout().unwrap(),
            Arc::new(desc),
            point,
        )
    }
}

impl std::ops::Deref for TestRenderer {
    type Target = Renderer<NullBackend>;

    fn deref(&self) -> &Self::Target {
        &self.renderer
    }
}

impl std::ops::DerefMut for TestRenderer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.renderer
    }
}

pub struct ColorTarget {
    pub texture: Arc<Texture>,
    pub pass: Arc<RenderPass>,
    pub framebuffer: Arc<Framebuffer>,
}

impl ColorTarget {
    pub fn clear_values(&self) -> [ClearValue; 1] {
        [ClearValue::Color([0.0, 0.0, 0.0, 1.0])]
    }
}

pub fn position(calls: &[NullCall], pred: impl Fn(&NullCall) -> bool) -> usize {
    calls
        .iter()
        .position(pred)
        .expect("expected native call was not recorded")
}
