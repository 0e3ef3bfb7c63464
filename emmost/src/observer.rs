//! Node discovery and setup coordinator

use heapless::Vec;

use crate::addr::AddressRegistry;
use crate::config::{Config, ProcessingPolicy};
use crate::core::{NodeAddress, Signature};
use crate::driver::link::{CallError, Platform};
use crate::driver::message::{
    CheckResult, CommandResult, DiscoveryReport, Message, StarterState, SupervisorMode, TxStatus,
};
use crate::manager::NodeManager;
use crate::node::SyncWaiter;
use crate::record::{JoinState, NodeRecord, SetupState};
use crate::report::{Application, Report};
use crate::script::manager::{Caller, Completion};
use crate::script::{ScriptResult, ScriptStep};
use crate::time::Instant;
use crate::timer::Timer;

/// Cached outcome of the last discovery evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Evaluation {
    signature: Signature,
    record: Option<usize>,
    action: CheckResult,
}

/// Coordinates node discovery, setup, and supervision
///
/// The observer owns the node list, the node objects, and the platform collaborators. All
/// inputs arrive through `on_*` methods and only record what happened; [`NodeObserver::service`]
/// advances the state machines until no work is left. Inputs and `service` must be called
/// serially.
///
/// Per node, setup runs through synchronization, the optional init script, and route
/// activation. A periodic guard detects nodes stuck in setup and forces a resync, dropping a
/// node for good after the configured number of attempts.
pub struct NodeObserver<'a, P, A, const N: usize> {
    platform: P,
    app: A,
    config: Config,
    registry: AddressRegistry,
    records: Vec<NodeRecord<'a>, N>,
    nodes: NodeManager<'a, N>,
    evaluation: Option<Evaluation>,
    wakeup: Timer,
    waking: Option<(usize, Signature)>,
    guard: Timer,
    started: bool,
    last_node_checked: usize,
    tick_pending: bool,
}

impl<'a, P, A, const N: usize> NodeObserver<'a, P, A, N>
where
    P: Platform,
    A: Application<'a>,
{
    pub fn new(platform: P, app: A, mut records: Vec<NodeRecord<'a>, N>, config: Config) -> Self {
        for record in records.iter_mut() {
            record.reset();
        }
        Self {
            platform,
            app,
            config,
            registry: AddressRegistry::new(),
            records,
            nodes: NodeManager::new(config.script_timeout),
            evaluation: None,
            wakeup: Timer::new(),
            waking: None,
            guard: Timer::new(),
            started: false,
            last_node_checked: 0,
            tick_pending: false,
        }
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    pub fn application(&self) -> &A {
        &self.app
    }

    pub fn application_mut(&mut self) -> &mut A {
        &mut self.app
    }

    pub fn records(&self) -> &[NodeRecord<'a>] {
        &self.records
    }

    pub fn record(&self, address: NodeAddress) -> Option<&NodeRecord<'a>> {
        self.records.iter().find(|record| record.address() == address)
    }

    pub fn registry(&self) -> &AddressRegistry {
        &self.registry
    }

    pub fn nodes(&self) -> &NodeManager<'a, N> {
        &self.nodes
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Tracks the network starter
    ///
    /// Supervision runs while the network is ready in normal mode. Leaving that state stops
    /// discovery and drops every node.
    pub fn on_manager_state(&mut self, mode: SupervisorMode, state: StarterState, now: Instant) {
        debug!("manager state {:?} {:?}", mode, state);
        if mode == SupervisorMode::Normal && state == StarterState::Ready {
            if !self.started {
                self.start(now);
            }
        } else if self.started {
            self.terminate();
        }
    }

    /// Chooses the discovery action for a signature candidate
    pub fn on_discovery_evaluate(&mut self, signature: &Signature) -> CheckResult {
        let address = signature.node_address;
        let mut record = None;
        let mut waiting = false;

        let action = if address.is_static() {
            record = self.record_index(address);
            match record.map(|index| self.records[index].lifecycle.joined) {
                Some(JoinState::NotJoined) => CheckResult::Welcome,
                Some(JoinState::Joined) => {
                    error!("discovered already joined node {:#x}", address.into_u16());
                    CheckResult::Unique
                }
                Some(JoinState::Waiting) => {
                    waiting = true;
                    CheckResult::Unknown
                }
                None => CheckResult::Unknown,
            }
        } else {
            CheckResult::Unknown
        };

        info!(
            "evaluate node {:#x} position {:#x}: {:?}",
            address.into_u16(),
            signature.node_position.into_u16(),
            action
        );
        self.evaluation = Some(Evaluation {
            signature: *signature,
            record,
            action,
        });

        if action == CheckResult::Unknown && !waiting {
            self.notify(Report::IgnoredUnknown, Some(*signature), None);
        }
        action
    }

    /// Handles the outcome of the discovery action
    pub fn on_discovery_report(
        &mut self,
        code: DiscoveryReport,
        signature: Option<&Signature>,
        now: Instant,
    ) {
        if code == DiscoveryReport::NetOff {
            // Invalidation follows the manager state
            debug!("discovery reports network off");
            return;
        }
        let Some(signature) = signature.copied() else {
            debug!("discovery report {:?} without signature", code);
            return;
        };
        let Some(evaluation) = self.evaluation else {
            error!("discovery report without evaluation");
            return;
        };
        let record = self.record_index(signature.node_address);
        if record != evaluation.record {
            error!(
                "discovery report for node {:#x} does not match the evaluation",
                signature.node_address.into_u16()
            );
            return;
        }
        let Some(index) = record else {
            return;
        };

        match (code, evaluation.action) {
            (DiscoveryReport::WelcomeSuccess, CheckResult::Welcome) => {
                info!("welcome of new node {:#x}", signature.node_address.into_u16());
                self.records[index].lifecycle.joined = JoinState::Joined;
                self.notify_node_joined(index, signature);
            }
            (DiscoveryReport::WelcomeSuccess, CheckResult::Unique) => {
                info!(
                    "welcome of existing node {:#x}, reset -> not available",
                    signature.node_address.into_u16()
                );
                self.records[index].lifecycle.joined = JoinState::Waiting;
                if let Err(err) = self.platform.set_node_available(signature.node_address, false) {
                    warn!("route deactivation rejected: {:?}", err);
                }
                self.notify(Report::NotAvailable, Some(signature), Some(index));
                if let Err(err) = self.platform.stop() {
                    warn!("discovery stop rejected: {:?}", err);
                }
                self.waking = Some((index, signature));
                self.wakeup.set(now, self.config.wakeup_delay, None);
            }
            (DiscoveryReport::Multi, CheckResult::Unique) => {
                info!("ignoring duplicate node {:#x}", signature.node_address.into_u16());
                self.notify(Report::IgnoredDuplicate, Some(signature), None);
            }
            (code, action) => {
                debug!(
                    "ignoring node {:#x}: {:?} after {:?}",
                    signature.node_address.into_u16(),
                    code,
                    action
                );
            }
        }
    }

    /// Sync result of the node at `address`
    pub fn on_sync_result(&mut self, address: NodeAddress, result: CommandResult) {
        let Some(node) = self.nodes.find_node(address, &self.registry) else {
            warn!("sync result for unknown node {:#x}", address.into_u16());
            return;
        };
        let key = node.address();
        match node.on_sync_result(result) {
            Some(SyncWaiter::Observer) => self.on_node_synchronized(key, result),
            Some(SyncWaiter::Application) => {
                let address = self.registry.replace_local_sentinel(key);
                self.app.on_sync_result(address, result);
            }
            None => {}
        }
    }

    /// Transmission status of a script message sent to `address`
    pub fn on_tx_status(&mut self, address: NodeAddress, status: TxStatus) {
        if let Some(node) = self.nodes.find_node(address, &self.registry) {
            node.script_mut().on_tx_status(status);
        }
    }

    /// Receive filter for control messages. Returns true if the message was consumed.
    pub fn on_message(&mut self, message: &Message<'_>) -> bool {
        match self.nodes.find_node(message.source, &self.registry) {
            Some(node) => node.script_mut().on_message(message),
            None => false,
        }
    }

    /// Result of a network configuration request sent to `address`
    pub fn on_network_config_result(&mut self, address: NodeAddress, result: CommandResult) {
        let Some(node) = self.nodes.find_node(address, &self.registry) else {
            warn!("network config result for unknown node {:#x}", address.into_u16());
            return;
        };
        if node.take_packet_filter_request() {
            let address = self.registry.replace_local_sentinel(node.address());
            self.app.on_packet_filter_result(address, result);
        } else {
            warn!("unsolicited network config result from {:#x}", address.into_u16());
        }
    }

    /// Synchronizes a known node on behalf of the application
    ///
    /// The result is delivered through [`Application::on_sync_result`].
    pub fn synchronize_node(&mut self, address: NodeAddress) -> Result<(), CallError> {
        let node = self
            .nodes
            .find_node(address, &self.registry)
            .ok_or(CallError::NotAvailable)?;
        node.synchronize(SyncWaiter::Application, &mut self.platform)
    }

    /// Runs a script on a known node on behalf of the application
    ///
    /// On success, the result is delivered through [`Application::on_script_result`].
    pub fn run_script(
        &mut self,
        address: NodeAddress,
        steps: &'a [ScriptStep<'a>],
        now: Instant,
    ) -> Result<(), CallError> {
        let node = self
            .nodes
            .find_node(address, &self.registry)
            .ok_or(CallError::NotAvailable)?;
        node.run_script(steps, Caller::Application, &mut self.platform, now)
    }

    /// Changes the packet filter mode of a known node
    ///
    /// The result is delivered through [`Application::on_packet_filter_result`].
    pub fn set_packet_filter(&mut self, address: NodeAddress, mode: u16) -> Result<(), CallError> {
        let node = self
            .nodes
            .find_node(address, &self.registry)
            .ok_or(CallError::NotAvailable)?;
        node.set_packet_filter(mode, &mut self.platform)
    }

    /// Number of joined nodes the guard currently considers stuck
    pub fn suspicious_node_count(&self) -> usize {
        (0..self.records.len())
            .filter(|&index| self.is_suspicious(index))
            .count()
    }

    /// Earliest instant at which [`NodeObserver::service`] has timed work to do
    pub fn next_deadline(&self) -> Option<Instant> {
        [self.guard.deadline(), self.wakeup.deadline()]
            .into_iter()
            .chain(self.nodes.iter().map(|node| node.script_next_deadline()))
            .flatten()
            .min()
    }

    /// Returns true if [`NodeObserver::service`] has untimed work to do.
    pub fn has_pending_work(&self) -> bool {
        self.tick_pending || self.nodes.iter().any(|node| node.script_has_pending_events())
    }

    /// Processes expired timers and pending events until the observer is idle.
    pub fn service(&mut self, now: Instant) {
        if self.guard.poll(now) {
            self.on_guard_timer();
        }
        if self.wakeup.poll(now) {
            self.on_wakeup_timer();
        }

        loop {
            let mut progressed = false;
            for index in 0..self.nodes.len() {
                let completion = self.nodes.get_mut(index).and_then(|node| {
                    let key = node.address();
                    node.script_mut()
                        .service(&mut self.platform, now)
                        .map(|completion| (key, completion))
                });
                if let Some((key, completion)) = completion {
                    self.on_script_completion(key, completion);
                    progressed = true;
                }
            }
            if core::mem::take(&mut self.tick_pending) {
                self.check_nodes(now);
                progressed = true;
            }
            if !progressed {
                break;
            }
        }
    }

    fn start(&mut self, now: Instant) {
        info!("starting node supervision");
        if let Err(err) = self.platform.start() {
            warn!("discovery start rejected: {:?}", err);
        }
        let period = self.config.guard_period;
        self.guard.set(now, period, Some(period));
        self.started = true;
    }

    fn terminate(&mut self) {
        info!("terminating node supervision");
        self.guard.clear();
        self.wakeup.clear();
        self.waking = None;
        self.evaluation = None;
        if let Err(err) = self.platform.stop() {
            warn!("discovery stop rejected: {:?}", err);
        }
        self.invalidate_all();
        self.started = false;
    }

    fn invalidate_all(&mut self) {
        for index in 0..self.records.len() {
            self.invalidate(index, false);
        }
        self.last_node_checked = 0;
    }

    /// Withdraws a node. With `keep_joined`, admission state and guard counters survive.
    fn invalidate(&mut self, index: usize, keep_joined: bool) {
        let address = self.records[index].address();
        let was_joined = self.records[index].lifecycle.joined == JoinState::Joined;

        if was_joined {
            if let Err(err) = self.platform.set_node_available(address, false) {
                warn!("route deactivation rejected: {:?}", err);
            }
            match self.nodes.find_node(address, &self.registry) {
                Some(node) => node.report_sync_lost(&mut self.platform),
                None => warn!("joined node {:#x} has no node object", address.into_u16()),
            }
        }

        if !keep_joined {
            if was_joined {
                self.notify(Report::NotAvailable, None, Some(index));
            }
            self.records[index].reset();
        }
    }

    fn notify_node_joined(&mut self, index: usize, signature: Signature) {
        if signature.node_position.is_root() {
            self.registry.notify_own_address(signature.node_address);
        }
        let lifecycle = &mut self.records[index].lifecycle;
        lifecycle.signature = signature;
        lifecycle.setup_state = SetupState::Sync;
        lifecycle.guard_count = 0;
        lifecycle.guard_retries = 0;
        self.tick_pending = true;
        self.notify(Report::Welcomed, Some(signature), Some(index));
    }

    /// Reports to the application, filling in the last known signature if none is given
    fn notify(&mut self, report: Report, signature: Option<Signature>, index: Option<usize>) {
        let signature =
            signature.or_else(|| index.map(|index| self.records[index].lifecycle.signature));
        info!(
            "report {:?} for node {:#x}",
            report,
            signature.map_or(0, |s| s.node_address.into_u16())
        );
        let node = match (report, index) {
            (Report::Welcomed, Some(index)) => self.records.get_mut(index),
            _ => None,
        };
        self.app.on_report(report, signature.as_ref(), node);
    }

    fn on_wakeup_timer(&mut self) {
        if let Some((index, signature)) = self.waking.take() {
            if self.records[index].lifecycle.joined == JoinState::Waiting {
                info!(
                    "welcome of existing node {:#x}, reset -> available",
                    signature.node_address.into_u16()
                );
                self.records[index].lifecycle.joined = JoinState::Joined;
                self.notify_node_joined(index, signature);
            }
        }
        if let Err(err) = self.platform.start() {
            warn!("discovery restart rejected: {:?}", err);
        }
    }

    fn on_node_synchronized(&mut self, key: NodeAddress, result: CommandResult) {
        let address = self.registry.replace_local_sentinel(key);
        let Some(index) = self.record_index(address) else {
            warn!("sync result for unlisted node {:#x}", address.into_u16());
            return;
        };
        let lifecycle = &mut self.records[index].lifecycle;
        lifecycle.setup_state = match (lifecycle.setup_state, result) {
            (SetupState::SyncRunning, Ok(())) => SetupState::ScriptScheduled,
            (SetupState::SyncRunning, Err(failure)) => {
                error!("sync of node {:#x} failed: {:?}", address.into_u16(), failure);
                SetupState::EndError
            }
            (state, _) => {
                error!(
                    "sync result for node {:#x} in state {:?}",
                    address.into_u16(),
                    state
                );
                SetupState::EndError
            }
        };
        self.tick_pending = true;
    }

    fn on_script_completion(&mut self, key: NodeAddress, completion: Completion) {
        let address = self.registry.replace_local_sentinel(key);
        match completion.caller {
            Caller::Observer => self.on_init_script_result(address, completion.result),
            Caller::Application => {
                let result = completion.result;
                self.app
                    .on_script_result(address, result.code, result.error_info)
            }
        }
    }

    fn on_init_script_result(&mut self, address: NodeAddress, result: ScriptResult) {
        let Some(index) = self.record_index(address) else {
            warn!("script result for unlisted node {:#x}", address.into_u16());
            return;
        };
        let state = self.records[index].lifecycle.setup_state;
        let next = match state {
            SetupState::ScriptRunning if result.is_success() => SetupState::ScriptSuccess,
            SetupState::ScriptRunning => {
                error!(
                    "init script of node {:#x} failed: {:?} at step {}",
                    address.into_u16(),
                    result.code,
                    result.error_info.step_index
                );
                if let Some(node) = self.nodes.find_node(address, &self.registry) {
                    node.report_sync_lost(&mut self.platform);
                }
                SetupState::ScriptFailed
            }
            state => {
                error!(
                    "script result for node {:#x} in state {:?}",
                    address.into_u16(),
                    state
                );
                SetupState::EndError
            }
        };
        self.records[index].lifecycle.setup_state = next;
        self.tick_pending = true;
    }

    fn check_nodes(&mut self, now: Instant) {
        let len = self.records.len();
        if len == 0 {
            return;
        }
        match self.config.processing {
            ProcessingPolicy::Alternate => {
                let first = self.last_node_checked % len;
                let mut index = first;
                loop {
                    if !self.check_node(index, now).is_settled() {
                        break;
                    }
                    index = (index + 1) % len;
                    if index == first {
                        break;
                    }
                }
                self.last_node_checked = index;
            }
            ProcessingPolicy::RoundRobin => {
                for index in 0..len {
                    self.check_node(index, now);
                }
            }
        }
    }

    /// Runs one setup transition for a node and re-arms the tick on change
    fn check_node(&mut self, index: usize, now: Instant) -> SetupState {
        let lifecycle = &mut self.records[index].lifecycle;
        if lifecycle.joined != JoinState::Joined {
            lifecycle.setup_state = SetupState::Idle;
        }
        let state = lifecycle.setup_state;
        let next = self.advance(index, state, now);
        self.records[index].lifecycle.setup_state = next;
        if next != state {
            trace!(
                "node {:#x}: {:?} -> {:?}",
                self.records[index].address().into_u16(),
                state,
                next
            );
            self.tick_pending = true;
        }
        next
    }

    fn advance(&mut self, index: usize, state: SetupState, now: Instant) -> SetupState {
        match state {
            SetupState::Sync => self.start_sync(index),
            SetupState::ScriptScheduled => self.start_init_script(index, now),
            SetupState::ScriptSuccess => {
                self.notify(Report::ScriptSuccess, None, Some(index));
                SetupState::ScriptDone
            }
            SetupState::ScriptFailed => {
                self.notify(Report::ScriptFailure, None, Some(index));
                SetupState::EndError
            }
            SetupState::ScriptMissing => SetupState::ScriptDone,
            SetupState::ScriptDone => {
                let address = self.records[index].address();
                if let Err(err) = self.platform.set_node_available(address, true) {
                    warn!("route activation rejected: {:?}", err);
                }
                self.records[index].lifecycle.setup_state = SetupState::EndSuccess;
                self.notify(Report::Available, None, Some(index));
                SetupState::EndSuccess
            }
            SetupState::UnsyncStart => {
                self.invalidate(index, true);
                SetupState::UnsyncWait
            }
            SetupState::UnsyncWait => SetupState::Sync,
            SetupState::UnsyncStop => {
                self.invalidate(index, true);
                SetupState::Idle
            }
            SetupState::Idle
            | SetupState::SyncRunning
            | SetupState::ScriptRunning
            | SetupState::EndSuccess
            | SetupState::EndError => state,
        }
    }

    fn start_sync(&mut self, index: usize) -> SetupState {
        let record = &self.records[index];
        let signature = record.lifecycle.signature;
        let remote_attach_disabled = record.remote_attach_disabled;

        let Some(node) = self.nodes.create_node(
            signature.node_address,
            signature.node_position,
            &mut self.registry,
        ) else {
            error!("cannot create node {:#x}", signature.node_address.into_u16());
            return SetupState::EndError;
        };
        if remote_attach_disabled {
            debug!("node {:#x} skips sync", signature.node_address.into_u16());
            return SetupState::ScriptDone;
        }
        match node.synchronize(SyncWaiter::Observer, &mut self.platform) {
            Ok(()) => SetupState::SyncRunning,
            Err(err) => {
                error!(
                    "synchronize node {:#x} rejected: {:?}",
                    signature.node_address.into_u16(),
                    err
                );
                SetupState::EndError
            }
        }
    }

    fn start_init_script(&mut self, index: usize, now: Instant) -> SetupState {
        let record = &self.records[index];
        let address = record.address();
        let Some(script) = record.init_script.filter(|script| !script.is_empty()) else {
            return SetupState::ScriptMissing;
        };
        let Some(node) = self.nodes.find_node(address, &self.registry) else {
            error!("scripting cannot find node {:#x}", address.into_u16());
            return SetupState::EndError;
        };
        match node.run_script(script, Caller::Observer, &mut self.platform, now) {
            Ok(()) => SetupState::ScriptRunning,
            Err(err) => {
                error!(
                    "cannot start script on node {:#x}: {:?}",
                    address.into_u16(),
                    err
                );
                SetupState::EndError
            }
        }
    }

    fn on_guard_timer(&mut self) {
        for index in 0..self.records.len() {
            self.guard_node(index);
        }
    }

    fn guard_node(&mut self, index: usize) {
        let count_limit = self.config.guard_count_limit;
        let retry_limit = u16::from(self.config.guard_retry_limit);
        if !self.is_suspicious(index) || self.records[index].lifecycle.guard_retries > retry_limit {
            return;
        }

        let address = self.records[index].address();
        let lifecycle = &mut self.records[index].lifecycle;
        lifecycle.guard_count += 1;
        debug!(
            "guard: node {:#x} state {:?} count {} retries {}",
            address.into_u16(),
            lifecycle.setup_state,
            lifecycle.guard_count,
            lifecycle.guard_retries
        );
        if lifecycle.guard_count < count_limit {
            return;
        }

        let irrecoverable = lifecycle.guard_retries >= retry_limit;
        lifecycle.guard_count = 0;
        lifecycle.guard_retries += 1;
        if irrecoverable {
            error!("all retries failed for node {:#x}", address.into_u16());
            lifecycle.setup_state = SetupState::UnsyncStop;
            self.notify(Report::Irrecoverable, None, Some(index));
        } else {
            error!("forcing resync of node {:#x}", address.into_u16());
            lifecycle.setup_state = SetupState::UnsyncStart;
        }
        self.tick_pending = true;
    }

    /// A joined node is suspicious in the error state, or if processing is parked on it in any
    /// state other than the two that may legitimately last.
    fn is_suspicious(&self, index: usize) -> bool {
        let lifecycle = &self.records[index].lifecycle;
        if lifecycle.joined != JoinState::Joined {
            return false;
        }
        let in_progress = match self.config.processing {
            ProcessingPolicy::Alternate => index == self.last_node_checked,
            ProcessingPolicy::RoundRobin => true,
        };
        match lifecycle.setup_state {
            SetupState::EndError => true,
            SetupState::EndSuccess | SetupState::ScriptRunning => false,
            _ => in_progress,
        }
    }

    fn record_index(&self, address: NodeAddress) -> Option<usize> {
        self.records.iter().position(|record| record.address() == address)
    }
}
