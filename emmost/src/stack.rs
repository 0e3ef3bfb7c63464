//! Shared observer handle and its background runner

use core::cell::RefCell;

use embassy_futures::select::select;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;

use crate::driver::link::Platform;
use crate::observer::NodeObserver;
use crate::report::Application;
use crate::time::Instant;

/// Node observer shared between the platform callbacks and the [`Runner`]
///
/// Every access goes through [`Stack::with`], which serializes it under the mutex and wakes the
/// runner afterwards. The application callbacks run with the mutex held and must not access the
/// stack again.
pub struct Stack<'a, M: RawMutex, P, A, const N: usize> {
    observer: Mutex<M, RefCell<NodeObserver<'a, P, A, N>>>,
    wake: Signal<M, ()>,
}

impl<'a, M, P, A, const N: usize> Stack<'a, M, P, A, N>
where
    M: RawMutex,
    P: Platform,
    A: Application<'a>,
{
    pub fn new(observer: NodeObserver<'a, P, A, N>) -> Self {
        Self {
            observer: Mutex::new(RefCell::new(observer)),
            wake: Signal::new(),
        }
    }

    /// Runs `f` on the observer and schedules a service pass.
    pub fn with<R>(&self, f: impl FnOnce(&mut NodeObserver<'a, P, A, N>) -> R) -> R {
        let result = self.observer.lock(|cell| f(&mut cell.borrow_mut()));
        self.wake.signal(());
        result
    }

    pub fn runner(&self) -> Runner<'_, 'a, M, P, A, N> {
        Runner { stack: self }
    }

    fn service(&self, now: Instant) -> Option<Instant> {
        self.observer.lock(|cell| {
            let mut observer = cell.borrow_mut();
            observer.service(now);
            observer.next_deadline()
        })
    }
}

/// Stack background task runner.
///
/// Run for timers and deferred processing to take effect.
pub struct Runner<'s, 'a, M: RawMutex, P, A, const N: usize> {
    stack: &'s Stack<'a, M, P, A, N>,
}

impl<'s, 'a, M, P, A, const N: usize> Runner<'s, 'a, M, P, A, N>
where
    M: RawMutex,
    P: Platform,
    A: Application<'a>,
{
    pub async fn run(&mut self) -> ! {
        loop {
            match self.stack.service(Instant::now()) {
                Some(deadline) => {
                    select(embassy_time::Timer::at(deadline), self.stack.wake.wait()).await;
                }
                None => self.stack.wake.wait().await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use core::future::Future;
    use core::pin::pin;
    use core::task::Context;

    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
    use futures_test::task::new_count_waker;
    use heapless::Vec;

    use super::*;
    use crate::config::Config;
    use crate::core::{MessageId, NodeAddress, Signature};
    use crate::driver::link::{
        CallError, NetworkConfig, NoBuffer, NodeDiscovery, RemoteSync, RouteManagement, Transport,
    };
    use crate::driver::message::{
        DeviceState, NetworkConfigMask, NetworkSettings, StarterState, SupervisorMode,
    };
    use crate::record::NodeRecord;
    use crate::report::Report;

    #[derive(Default)]
    struct IdlePlatform {
        discovery_running: bool,
    }

    impl Transport for IdlePlatform {
        fn send(&mut self, _: NodeAddress, _: MessageId, _: &[u8]) -> Result<(), NoBuffer> {
            Err(NoBuffer)
        }
    }

    impl RemoteSync for IdlePlatform {
        fn sync(&mut self, _: NodeAddress) -> Result<(), CallError> {
            Err(CallError::NotAvailable)
        }

        fn report_sync_lost(&mut self, _: NodeAddress) {}

        fn device_state(&self, _: NodeAddress) -> DeviceState {
            DeviceState::Unsynced
        }
    }

    impl RouteManagement for IdlePlatform {
        fn set_node_available(&mut self, _: NodeAddress, _: bool) -> Result<(), CallError> {
            Ok(())
        }
    }

    impl NodeDiscovery for IdlePlatform {
        fn start(&mut self) -> Result<(), CallError> {
            self.discovery_running = true;
            Ok(())
        }

        fn stop(&mut self) -> Result<(), CallError> {
            self.discovery_running = false;
            Ok(())
        }
    }

    impl NetworkConfig for IdlePlatform {
        fn set_network_config(
            &mut self,
            _: NodeAddress,
            _: NetworkConfigMask,
            _: &NetworkSettings,
        ) -> Result<(), CallError> {
            Err(CallError::NotAvailable)
        }
    }

    struct SilentApp;

    impl<'a> Application<'a> for SilentApp {
        fn on_report(&mut self, _: Report, _: Option<&Signature>, _: Option<&mut NodeRecord<'a>>) {}
    }

    #[test]
    fn test_access_wakes_runner() {
        let (waker, count) = new_count_waker();
        let cx = &mut Context::from_waker(&waker);

        let observer = NodeObserver::<_, _, 4>::new(
            IdlePlatform::default(),
            SilentApp,
            Vec::new(),
            Config::default(),
        );
        let stack = Stack::<CriticalSectionRawMutex, _, _, 4>::new(observer);
        let mut runner = stack.runner();
        let mut run = pin!(runner.run());

        assert!(run.as_mut().poll(cx).is_pending());
        assert_eq!(count.get(), 0);

        stack.with(|observer| {
            observer.on_manager_state(SupervisorMode::Normal, StarterState::Ready, Instant::now())
        });
        assert_eq!(count.get(), 1);
        assert!(stack.with(|observer| observer.platform().discovery_running));

        assert!(run.as_mut().poll(cx).is_pending());
        assert!(stack.with(|observer| observer.next_deadline()).is_some());
    }
}
