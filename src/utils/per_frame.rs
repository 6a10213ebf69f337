/// Fixed ring of per-frame values; only the current entry is written to.
#[derive(Debug)]
pub struct PerFrame<T> {
    frames: Vec<T>,
    curr_frame: u16,
}

impl<T> PerFrame<T>
where
    T: Default,
{
    pub fn new(num_frames: usize) -> Self {
        let mut frames = Vec::with_capacity(num_frames.max(1));
        frames.resize_with(num_frames.max(1), T::default);
        Self {
            frames,
            curr_frame: 0,
        }
    }

    pub fn curr(&self) -> &T {
        &self.frames[self.curr_frame as usize]
    }

    pub fn curr_mut(&mut self) -> &mut T {
        &mut self.frames[self.curr_frame as usize]
    }

    pub fn curr_idx(&self) -> usize {
        self.curr_frame as usize
    }

    pub fn advance_next_frame(&mut self) {
        self.curr_frame = (self.curr_frame + 1) % self.frames.len() as u16;
    }

    /// Takes the current entry, leaving a default value, then moves to the next frame.
    pub fn take_and_advance(&mut self) -> T {
        let taken = std::mem::take(self.curr_mut());
        self.advance_next_frame();
        taken
    }

    pub fn for_each<F>(&self, mut func: F)
    where
        F: FnMut(&T),
    {
        for i in &self.frames {
            func(i);
        }
    }

    pub fn for_each_mut<F>(&mut self, mut func: F)
    where
        F: FnMut(&mut T),
    {
        for i in &mut self.frames {
            func(i);
        }
    }
}
