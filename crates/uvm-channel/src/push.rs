//! # Push
//!
//! One unit of recorded work, submitted as a single GPFIFO entry.

use alloc::boxed::Box;
use alloc::string::String;
use core::fmt;
use core::panic::Location;

use uvm_core::Result;
use uvm_hal::{Gpu, PushRegion, PushStream};

use crate::channel::Channel;

/// A push being recorded on a claimed channel slot.
///
/// Ending the push submits it. A push dropped without being ended is
/// submitted as recorded so its slot and pushbuffer space are not lost.
#[must_use = "a push holds a claimed GPFIFO slot until it is ended"]
pub struct Push<'a, G: Gpu> {
    channel: &'a Channel<G>,
    region: PushRegion,
    stream: PushStream,
    push_info: u32,
    submitted: bool,
}

impl<'a, G: Gpu> Push<'a, G> {
    /// Reserve a slot on `channel` and begin a push on it
    #[track_caller]
    pub fn begin_on_channel(channel: &'a Channel<G>, description: impl Into<String>) -> Result<Self> {
        let location = Location::caller();
        channel.reserve()?;
        Self::begin_reserved(channel, description.into(), location)
    }

    /// Begin a push on a channel whose slot is already claimed
    pub(crate) fn begin_reserved(
        channel: &'a Channel<G>,
        description: String,
        location: &'static Location<'static>,
    ) -> Result<Self> {
        let (region, push_info) = channel.begin_push(description, location)?;

        Ok(Self {
            channel,
            region,
            stream: PushStream::new(),
            push_info,
            submitted: false,
        })
    }

    /// Get the channel the push goes to
    pub fn channel(&self) -> &'a Channel<G> {
        self.channel
    }

    /// Get the pushbuffer region backing the push
    pub fn region(&self) -> &PushRegion {
        &self.region
    }

    /// Append raw method dwords
    pub fn emit(&mut self, words: &[u32]) {
        self.stream.emit(words);
    }

    /// Method stream, for HAL encoders
    pub fn stream_mut(&mut self) -> &mut PushStream {
        &mut self.stream
    }

    /// Run `callback` once the push retires
    pub fn set_on_complete(&mut self, callback: impl FnOnce() + Send + 'static) {
        self.channel.set_on_complete(self.push_info, Box::new(callback));
    }

    fn submit(&mut self) -> u64 {
        self.submitted = true;
        self.channel.end_push(&self.region, &mut self.stream, self.push_info)
    }

    /// Submit the push and return its tracking value
    pub fn end(mut self) -> u64 {
        self.submit()
    }

    /// Submit the push and wait for the device to complete it
    pub fn end_and_wait(mut self) -> Result<()> {
        let value = self.submit();
        self.channel.wait_for_value(value)
    }
}

impl<G: Gpu> fmt::Debug for Push<'_, G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Push")
            .field("channel", &self.channel.name())
            .field("region", &self.region)
            .field("size", &self.stream.size())
            .finish()
    }
}

impl<G: Gpu> Drop for Push<'_, G> {
    fn drop(&mut self) {
        if !self.submitted {
            log::warn!("Push dropped without being ended on channel {}", self.channel.name());
            self.submit();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel_type::ChannelType;
    use crate::manager::ManagerConfig;
    use crate::mock::{self, MockGpu};
    use alloc::sync::Arc;
    use core::sync::atomic::{AtomicBool, Ordering};
    use uvm_core::Error;

    fn channel(gpu: &Arc<MockGpu>) -> Channel<MockGpu> {
        let ctx = mock::context(gpu.clone(), ManagerConfig::default());
        Channel::create(&ctx, ChannelType::CpuToGpu, 0).unwrap()
    }

    #[test]
    fn test_end_returns_increasing_values() {
        let gpu = Arc::new(MockGpu::new(8));
        let channel = channel(&gpu);

        let first = Push::begin_on_channel(&channel, "one").unwrap().end();
        let second = Push::begin_on_channel(&channel, "two").unwrap().end();
        assert_eq!((first, second), (1, 2));
    }

    #[test]
    fn test_push_carries_semaphore_release() {
        let gpu = Arc::new(MockGpu::new(8));
        let channel = channel(&gpu);

        let mut push = Push::begin_on_channel(&channel, "copy").unwrap();
        push.emit(&[0x1, 0x2]);
        let value = push.end();

        let words = gpu.last_staged_words();
        assert_eq!(&words[..2], &[0x1, 0x2]);
        assert_eq!(words[2], mock::TEST_SEMAPHORE_RELEASE);
        assert_eq!(words[5], value as u32);
    }

    #[test]
    fn test_end_and_wait() {
        let gpu = Arc::new(MockGpu::new(8));
        gpu.device().set_auto_execute(true);
        let channel = channel(&gpu);

        Push::begin_on_channel(&channel, "sync").unwrap().end_and_wait().unwrap();
        assert!(channel.is_value_completed(1));
    }

    #[test]
    fn test_end_and_wait_fails_on_fault() {
        let gpu = Arc::new(MockGpu::new(8));
        let channel = channel(&gpu);

        let push = Push::begin_on_channel(&channel, "hang").unwrap();
        channel.hw().inject_fault(1);
        assert_eq!(push.end_and_wait(), Err(Error::RuntimeFault));
    }

    #[test]
    fn test_location_points_at_caller() {
        let gpu = Arc::new(MockGpu::new(8));
        let channel = channel(&gpu);

        let push = Push::begin_on_channel(&channel, "located").unwrap();
        let line = line!() - 1;
        push.end();

        let record = channel.fatal_entry().unwrap();
        let location = record.location.unwrap();
        assert_eq!(location.file(), file!());
        assert_eq!(location.line(), line);
    }

    #[test]
    fn test_on_complete() {
        let gpu = Arc::new(MockGpu::new(8));
        let channel = channel(&gpu);
        let done = Arc::new(AtomicBool::new(false));

        let mut push = Push::begin_on_channel(&channel, "notify").unwrap();
        let flag = done.clone();
        push.set_on_complete(move || flag.store(true, Ordering::SeqCst));
        push.end();

        gpu.device().execute_all();
        channel.update_progress();
        assert!(done.load(Ordering::SeqCst));
    }

    #[test]
    fn test_dropped_push_is_submitted() {
        let gpu = Arc::new(MockGpu::new(4));
        let channel = channel(&gpu);

        drop(Push::begin_on_channel(&channel, "forgotten").unwrap());
        assert_eq!(channel.queued_value(), 1);
        assert_eq!(channel.pending_count(), 1);
        assert_eq!(channel.state.lock().ring.current_pushes(), 0);
    }
}
