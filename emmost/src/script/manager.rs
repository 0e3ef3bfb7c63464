use crate::core::NodeAddress;
use crate::driver::link::{CallError, RemoteSync, Transport};
use crate::driver::message::{CommandFailure, CommandResult, DeviceState, Message, TxStatus};
use crate::script::{ResultCode, ScriptResult, ScriptStep};
use crate::time::{Duration, Instant};
use crate::timer::{TimedLock, Timer};

/// Origin of a script run, selects where the result goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum Caller {
    /// Init script started by the node observer
    Observer,
    /// Script started through the application API
    Application,
}

/// Terminal outcome of a script run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) struct Completion {
    pub caller: Caller,
    pub result: ScriptResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum Phase {
    Idle,
    DeviceSync,
    NextStep,
    Paused,
    StepSent,
}

struct Run<'a> {
    steps: &'a [ScriptStep<'a>],
    index: usize,
    pending_pause: Duration,
    caller: Caller,
    result: ScriptResult,
}

impl<'a> Run<'a> {
    fn current(&self) -> Option<&'a ScriptStep<'a>> {
        self.steps.get(self.index)
    }

    fn advance(&mut self) {
        self.index += 1;
        self.result.error_info.step_index = self.result.error_info.step_index.saturating_add(1);
        self.pending_pause = self
            .current()
            .map_or(Duration::from_ticks(0), |step| step.pause);
    }

    fn fail(&mut self, code: ResultCode) {
        self.result.code = code;
    }
}

/// Executes scripts against one target node
///
/// Only one script runs at a time. Steps execute strictly in order: a step is sent only after
/// the response to the previous one matched. Any failure aborts the remaining steps.
///
/// The manager is polled: receive, transmission, and sync callbacks only record what happened,
/// and [`ScriptManager::service`] advances the run and yields the terminal result exactly once.
pub(crate) struct ScriptManager<'a> {
    target: NodeAddress,
    run: Option<Run<'a>>,
    phase: Phase,
    pause: Timer,
    tx_lock: TimedLock,
    next_step_pending: bool,
    error_pending: bool,
}

impl<'a> ScriptManager<'a> {
    pub fn new(target: NodeAddress, timeout: Duration) -> Self {
        Self {
            target,
            run: None,
            phase: Phase::Idle,
            pause: Timer::new(),
            tx_lock: TimedLock::new(timeout),
            next_step_pending: false,
            error_pending: false,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.run.is_some()
    }

    pub fn is_awaiting_sync(&self) -> bool {
        self.phase == Phase::DeviceSync
    }

    pub fn has_pending_events(&self) -> bool {
        self.next_step_pending || self.error_pending
    }

    /// Earliest instant at which [`ScriptManager::service`] has timed work to do
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.pause.deadline(), self.tx_lock.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Starts a script run.
    ///
    /// On error, nothing has been started and no result will be delivered.
    pub fn run<P>(
        &mut self,
        steps: &'a [ScriptStep<'a>],
        caller: Caller,
        platform: &mut P,
        now: Instant,
    ) -> Result<(), CallError>
    where
        P: Transport + RemoteSync,
    {
        if self.is_busy() {
            warn!("script rejected, node {:#x} busy", self.target.into_u16());
            return Err(CallError::ApiLocked);
        }
        let Some(first) = steps.first() else {
            return Err(CallError::Param);
        };

        self.run = Some(Run {
            steps,
            index: 0,
            pending_pause: first.pause,
            caller,
            result: ScriptResult::default(),
        });
        self.next_step_pending = false;
        self.error_pending = false;

        let started = if platform.device_state(self.target) == DeviceState::Synced {
            self.process_step(platform, now)
        } else {
            self.request_device_sync(platform, now)
        };

        match started {
            Ok(()) => {
                debug!(
                    "script of {} steps started on node {:#x}",
                    steps.len(),
                    self.target.into_u16()
                );
            }
            Err(err) => {
                warn!(
                    "script start failed on node {:#x}: {:?}",
                    self.target.into_u16(),
                    err
                );
                self.reset();
            }
        }
        started
    }

    /// Receive filter. Returns true if the message was the expected step response.
    ///
    /// The message is not retained.
    pub fn on_message(&mut self, message: &Message<'_>) -> bool {
        if self.phase != Phase::StepSent {
            return false;
        }
        let Some(run) = self.run.as_mut() else {
            return false;
        };
        let Some(step) = run.current() else {
            return false;
        };
        let expected = &step.expected;
        if !expected.id.same_function(&message.id) {
            return false;
        }

        let failure = if expected.id.op_type != message.id.op_type {
            error!(
                "node {:#x} step {}: unexpected op type {:#x}",
                self.target.into_u16(),
                run.index,
                message.id.op_type.into_u8()
            );
            Some(ResultCode::OpType)
        } else if !expected.payload.matches(message.payload) {
            error!(
                "node {:#x} step {}: unexpected payload",
                self.target.into_u16(),
                run.index
            );
            Some(ResultCode::Payload)
        } else {
            None
        };

        self.tx_lock.release();
        match failure {
            Some(code) => {
                run.fail(code);
                run.result.error_info.function_id = message.id.function_id;
                self.phase = Phase::Idle;
                self.error_pending = true;
                false
            }
            None => {
                trace!("node {:#x} step {} completed", self.target.into_u16(), run.index);
                run.advance();
                self.phase = Phase::NextStep;
                self.next_step_pending = true;
                true
            }
        }
    }

    /// Transmission status of the last sent step
    pub fn on_tx_status(&mut self, status: TxStatus) {
        if status.is_ok() || self.phase != Phase::StepSent {
            return;
        }
        let Some(run) = self.run.as_mut() else {
            return;
        };
        error!(
            "node {:#x} step {}: transmission failed: {:?}",
            self.target.into_u16(),
            run.index,
            status
        );
        run.fail(ResultCode::Tx);
        run.result.detail = Some(CommandFailure::Tx(status));
        self.tx_lock.release();
        self.phase = Phase::Idle;
        self.error_pending = true;
    }

    /// Outcome of the device sync requested at script start
    pub fn on_sync_result(&mut self, result: CommandResult) {
        if self.phase != Phase::DeviceSync {
            return;
        }
        let Some(run) = self.run.as_mut() else {
            return;
        };
        self.tx_lock.release();
        match result {
            Ok(()) => {
                debug!("node {:#x} synchronized", self.target.into_u16());
                self.phase = Phase::NextStep;
                self.next_step_pending = true;
            }
            Err(failure) => {
                error!(
                    "node {:#x} device sync failed: {:?}",
                    self.target.into_u16(),
                    failure
                );
                run.fail(ResultCode::Sync);
                run.result.detail = Some(failure);
                self.phase = Phase::Idle;
                self.error_pending = true;
            }
        }
    }

    /// Advances the run. Returns the terminal result once.
    pub fn service<P>(&mut self, platform: &mut P, now: Instant) -> Option<Completion>
    where
        P: Transport + RemoteSync,
    {
        let run = self.run.as_mut()?;

        if self.pause.poll(now) {
            trace!("node {:#x} pause elapsed", self.target.into_u16());
            run.pending_pause = Duration::from_ticks(0);
            self.phase = Phase::NextStep;
            self.next_step_pending = true;
        }

        if self.tx_lock.poll_timeout(now) {
            error!("node {:#x} script timed out", self.target.into_u16());
            run.fail(ResultCode::Timeout);
            self.phase = Phase::Idle;
            self.error_pending = true;
        }

        if core::mem::take(&mut self.next_step_pending) && !self.error_pending {
            if run.current().is_none() {
                info!("script on node {:#x} finished", self.target.into_u16());
                return self.complete();
            }
            if let Err(err) = self.process_step(platform, now) {
                error!(
                    "node {:#x} step could not be sent: {:?}",
                    self.target.into_u16(),
                    err
                );
                if let Some(run) = self.run.as_mut() {
                    run.fail(ResultCode::Tx);
                }
                self.error_pending = true;
            }
        }

        if core::mem::take(&mut self.error_pending) {
            return self.complete();
        }
        None
    }

    fn process_step<P>(&mut self, platform: &mut P, now: Instant) -> Result<(), CallError>
    where
        P: Transport + RemoteSync,
    {
        let Some(run) = self.run.as_ref() else {
            return Ok(());
        };
        let Some(step) = run.current() else {
            return Ok(());
        };

        if run.pending_pause > Duration::from_ticks(0) {
            if self.pause.is_in_use() {
                return Err(CallError::NotAvailable);
            }
            trace!(
                "node {:#x} pause {} ms",
                self.target.into_u16(),
                run.pending_pause.as_millis()
            );
            self.pause.set(now, run.pending_pause, None);
            self.phase = Phase::Paused;
            return Ok(());
        }

        if !self.tx_lock.try_lock(now) {
            return Err(CallError::ApiLocked);
        }
        if let Err(err) = platform.send(self.target, step.send.id, step.send.payload) {
            self.tx_lock.release();
            return Err(err.into());
        }
        trace!("node {:#x} step {} sent", self.target.into_u16(), run.index);
        self.phase = Phase::StepSent;
        Ok(())
    }

    fn request_device_sync<P>(&mut self, platform: &mut P, now: Instant) -> Result<(), CallError>
    where
        P: RemoteSync,
    {
        if !self.tx_lock.try_lock(now) {
            return Err(CallError::ApiLocked);
        }
        if let Err(err) = platform.sync(self.target) {
            self.tx_lock.release();
            return Err(err);
        }
        debug!("node {:#x} device sync requested", self.target.into_u16());
        self.phase = Phase::DeviceSync;
        Ok(())
    }

    fn complete(&mut self) -> Option<Completion> {
        let run = self.run.take()?;
        self.reset();
        Some(Completion {
            caller: run.caller,
            result: run.result,
        })
    }

    fn reset(&mut self) {
        self.run = None;
        self.phase = Phase::Idle;
        self.pause.clear();
        self.tx_lock.release();
        self.next_step_pending = false;
        self.error_pending = false;
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use std::vec::Vec;

    use super::*;
    use crate::core::{FunctionId, MessageId, OpType};
    use crate::driver::link::NoBuffer;
    use crate::script::{ExpectedMessage, ExpectedPayload, ScriptMessage};

    const TARGET: NodeAddress = NodeAddress::new(0x0200);
    const TIMEOUT: Duration = Duration::from_millis(100);

    const fn id(function: u16, op_type: OpType) -> MessageId {
        MessageId::new(0x52, 0x00, FunctionId::from_u16_truncating(function), op_type)
    }

    const STEPS: [ScriptStep<'static>; 2] = [
        ScriptStep::new(
            ScriptMessage {
                id: id(0x100, OpType::SET_GET),
                payload: &[0x01],
            },
            ExpectedMessage {
                id: id(0x100, OpType::STATUS),
                payload: ExpectedPayload::Any,
            },
        ),
        ScriptStep::new(
            ScriptMessage {
                id: id(0x101, OpType::SET_GET),
                payload: &[0x02, 0x03],
            },
            ExpectedMessage {
                id: id(0x101, OpType::STATUS),
                payload: ExpectedPayload::Prefix(&[0x02]),
            },
        )
        .with_pause(Duration::from_millis(50)),
    ];

    #[derive(Default)]
    struct MockPlatform {
        synced: bool,
        no_buffer: bool,
        sent: Vec<(NodeAddress, MessageId)>,
        sync_requests: usize,
    }

    impl Transport for MockPlatform {
        fn send(&mut self, destination: NodeAddress, id: MessageId, _payload: &[u8]) -> Result<(), NoBuffer> {
            if self.no_buffer {
                return Err(NoBuffer);
            }
            self.sent.push((destination, id));
            Ok(())
        }
    }

    impl RemoteSync for MockPlatform {
        fn sync(&mut self, _node: NodeAddress) -> Result<(), CallError> {
            self.sync_requests += 1;
            Ok(())
        }

        fn report_sync_lost(&mut self, _node: NodeAddress) {}

        fn device_state(&self, _node: NodeAddress) -> DeviceState {
            if self.synced {
                DeviceState::Synced
            } else {
                DeviceState::Unsynced
            }
        }
    }

    fn at(ms: u64) -> Instant {
        Instant::from_millis(ms)
    }

    fn response(function: u16, op_type: OpType, payload: &[u8]) -> Message<'_> {
        Message {
            source: TARGET,
            id: id(function, op_type),
            payload,
        }
    }

    fn synced_platform() -> MockPlatform {
        MockPlatform {
            synced: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_run_to_success() {
        let mut platform = synced_platform();
        let mut manager = ScriptManager::new(TARGET, TIMEOUT);

        manager.run(&STEPS, Caller::Observer, &mut platform, at(0)).unwrap();
        assert_eq!(platform.sent.len(), 1);
        assert!(manager.on_message(&response(0x100, OpType::STATUS, &[0xaa])));
        assert_eq!(manager.service(&mut platform, at(1)), None);

        // Second step waits for its pause
        assert_eq!(platform.sent.len(), 1);
        assert_eq!(manager.next_deadline(), Some(at(51)));
        assert_eq!(manager.service(&mut platform, at(50)), None);
        assert_eq!(manager.service(&mut platform, at(51)), None);
        assert_eq!(platform.sent.len(), 2);
        assert_eq!(platform.sent[1], (TARGET, id(0x101, OpType::SET_GET)));

        assert!(manager.on_message(&response(0x101, OpType::STATUS, &[0x02, 0x09])));
        let completion = manager.service(&mut platform, at(52)).unwrap();
        assert_eq!(completion.caller, Caller::Observer);
        assert!(completion.result.is_success());
        assert!(!manager.is_busy());
        assert_eq!(manager.service(&mut platform, at(53)), None);
    }

    #[test]
    fn test_second_run_is_locked() {
        let mut platform = synced_platform();
        let mut manager = ScriptManager::new(TARGET, TIMEOUT);

        manager.run(&STEPS, Caller::Observer, &mut platform, at(0)).unwrap();
        assert_eq!(
            manager.run(&STEPS, Caller::Application, &mut platform, at(1)),
            Err(CallError::ApiLocked)
        );
        assert_eq!(platform.sent.len(), 1);

        assert!(manager.on_message(&response(0x100, OpType::STATUS, &[])));
        assert!(manager.is_busy());
    }

    #[test]
    fn test_empty_script_rejected() {
        let mut platform = synced_platform();
        let mut manager = ScriptManager::new(TARGET, TIMEOUT);
        assert_eq!(
            manager.run(&[], Caller::Application, &mut platform, at(0)),
            Err(CallError::Param)
        );
        assert!(!manager.is_busy());
    }

    #[test]
    fn test_start_without_buffer() {
        let mut platform = MockPlatform {
            synced: true,
            no_buffer: true,
            ..Default::default()
        };
        let mut manager = ScriptManager::new(TARGET, TIMEOUT);
        assert_eq!(
            manager.run(&STEPS, Caller::Observer, &mut platform, at(0)),
            Err(CallError::BufferOverflow)
        );
        assert!(!manager.is_busy());
        assert_eq!(manager.service(&mut platform, at(1)), None);

        platform.no_buffer = false;
        manager.run(&STEPS, Caller::Observer, &mut platform, at(2)).unwrap();
    }

    #[test]
    fn test_payload_mismatch_aborts() {
        let mut platform = synced_platform();
        let mut manager = ScriptManager::new(TARGET, TIMEOUT);

        manager.run(&STEPS, Caller::Application, &mut platform, at(0)).unwrap();
        assert!(manager.on_message(&response(0x100, OpType::STATUS, &[])));
        manager.service(&mut platform, at(1));
        manager.service(&mut platform, at(51));
        assert_eq!(platform.sent.len(), 2);

        assert!(!manager.on_message(&response(0x101, OpType::STATUS, &[0x07])));
        let completion = manager.service(&mut platform, at(52)).unwrap();
        assert_eq!(completion.caller, Caller::Application);
        assert_eq!(completion.result.code, ResultCode::Payload);
        assert_eq!(completion.result.error_info.step_index, 1);
        assert_eq!(completion.result.error_info.function_id.into_u16(), 0x101);
        assert_eq!(platform.sent.len(), 2);
    }

    #[test]
    fn test_op_type_mismatch_aborts() {
        let mut platform = synced_platform();
        let mut manager = ScriptManager::new(TARGET, TIMEOUT);

        manager.run(&STEPS, Caller::Observer, &mut platform, at(0)).unwrap();
        assert!(!manager.on_message(&response(0x100, OpType::ERROR, &[])));
        let completion = manager.service(&mut platform, at(1)).unwrap();
        assert_eq!(completion.result.code, ResultCode::OpType);
        assert_eq!(completion.result.error_info.step_index, 0);
        assert_eq!(platform.sent.len(), 1);
    }

    #[test]
    fn test_unrelated_message_ignored() {
        let mut platform = synced_platform();
        let mut manager = ScriptManager::new(TARGET, TIMEOUT);

        manager.run(&STEPS, Caller::Observer, &mut platform, at(0)).unwrap();
        assert!(!manager.on_message(&response(0x333, OpType::STATUS, &[])));
        assert_eq!(manager.service(&mut platform, at(1)), None);
        assert!(manager.is_busy());
    }

    #[test]
    fn test_tx_failure() {
        let mut platform = synced_platform();
        let mut manager = ScriptManager::new(TARGET, TIMEOUT);

        manager.run(&STEPS, Caller::Observer, &mut platform, at(0)).unwrap();
        manager.on_tx_status(TxStatus::Ok);
        assert_eq!(manager.service(&mut platform, at(1)), None);
        manager.on_tx_status(TxStatus::Acknowledge);
        let completion = manager.service(&mut platform, at(2)).unwrap();
        assert_eq!(completion.result.code, ResultCode::Tx);
        assert_eq!(
            completion.result.detail,
            Some(CommandFailure::Tx(TxStatus::Acknowledge))
        );
    }

    #[test]
    fn test_response_timeout() {
        let mut platform = synced_platform();
        let mut manager = ScriptManager::new(TARGET, TIMEOUT);

        manager.run(&STEPS, Caller::Observer, &mut platform, at(0)).unwrap();
        assert_eq!(manager.next_deadline(), Some(at(100)));
        assert_eq!(manager.service(&mut platform, at(99)), None);
        let completion = manager.service(&mut platform, at(100)).unwrap();
        assert_eq!(completion.result.code, ResultCode::Timeout);
        assert!(!manager.on_message(&response(0x100, OpType::STATUS, &[])));
    }

    #[test]
    fn test_device_sync_first() {
        let mut platform = MockPlatform::default();
        let mut manager = ScriptManager::new(TARGET, TIMEOUT);

        manager.run(&STEPS, Caller::Observer, &mut platform, at(0)).unwrap();
        assert_eq!(platform.sync_requests, 1);
        assert!(platform.sent.is_empty());
        assert!(manager.is_awaiting_sync());

        manager.on_sync_result(Ok(()));
        assert_eq!(manager.service(&mut platform, at(1)), None);
        assert_eq!(platform.sent.len(), 1);
    }

    #[test]
    fn test_device_sync_failure() {
        let mut platform = MockPlatform::default();
        let mut manager = ScriptManager::new(TARGET, TIMEOUT);

        manager.run(&STEPS, Caller::Observer, &mut platform, at(0)).unwrap();
        manager.on_sync_result(Err(CommandFailure::Target(0x20)));
        let completion = manager.service(&mut platform, at(1)).unwrap();
        assert_eq!(completion.result.code, ResultCode::Sync);
        assert_eq!(completion.result.detail, Some(CommandFailure::Target(0x20)));
        assert!(platform.sent.is_empty());
    }

    #[test]
    fn test_device_sync_timeout() {
        let mut platform = MockPlatform::default();
        let mut manager = ScriptManager::new(TARGET, TIMEOUT);

        manager.run(&STEPS, Caller::Observer, &mut platform, at(0)).unwrap();
        let completion = manager.service(&mut platform, at(100)).unwrap();
        assert_eq!(completion.result.code, ResultCode::Timeout);
    }
}
