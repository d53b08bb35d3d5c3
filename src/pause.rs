use std::time::Duration;

/// Blocking wait between polls and retry attempts.
///
/// Production code sleeps the thread; tests record the requested durations
/// instead of waiting.
pub trait Pause {
    fn pause(&self, duration: Duration);
}

/// Sleeps the calling thread
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadPause;

impl Pause for ThreadPause {
    fn pause(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::Pause;
    use std::cell::RefCell;
    use std::time::Duration;

    /// Records every pause without sleeping
    #[derive(Debug, Default)]
    pub struct RecordingPause {
        pub pauses: RefCell<Vec<Duration>>,
    }

    impl RecordingPause {
        pub fn total(&self) -> Duration {
            self.pauses.borrow().iter().sum()
        }

        pub fn count(&self) -> usize {
            self.pauses.borrow().len()
        }
    }

    impl Pause for RecordingPause {
        fn pause(&self, duration: Duration) {
            self.pauses.borrow_mut().push(duration);
        }
    }

    impl<P: Pause> Pause for std::rc::Rc<P> {
        fn pause(&self, duration: Duration) {
            (**self).pause(duration)
        }
    }
}
