#![allow(dead_code)]

use emmost::core::{MessageId, NodeAddress, NodePosition, Signature};
use emmost::driver::link::{
    CallError, NetworkConfig, NoBuffer, NodeDiscovery, RemoteSync, RouteManagement, Transport,
};
use emmost::driver::message::{
    CommandResult, DeviceState, Message, NetworkConfigMask, NetworkSettings, StarterState,
    SupervisorMode,
};
use emmost::script::{ErrorInfo, ResultCode, ScriptStep};
use emmost::time::Instant;
use emmost::{Application, Config, NodeObserver, NodeRecord, Report};

pub const CAPACITY: usize = 8;

pub type Observer<'a> = NodeObserver<'a, MockPlatform, RecordingApp<'a>, CAPACITY>;

/// Collaborator services that record every request
#[derive(Default)]
pub struct MockPlatform {
    pub sent: Vec<(NodeAddress, MessageId, Vec<u8>)>,
    pub sync_requests: Vec<NodeAddress>,
    pub sync_lost: Vec<NodeAddress>,
    pub synced: Vec<NodeAddress>,
    pub routes: Vec<(NodeAddress, bool)>,
    pub discovery_running: bool,
    pub discovery_starts: usize,
    pub discovery_stops: usize,
    pub configs: Vec<(NodeAddress, NetworkConfigMask, NetworkSettings)>,
}

impl Transport for MockPlatform {
    fn send(&mut self, destination: NodeAddress, id: MessageId, payload: &[u8]) -> Result<(), NoBuffer> {
        self.sent.push((destination, id, payload.to_vec()));
        Ok(())
    }
}

impl RemoteSync for MockPlatform {
    fn sync(&mut self, node: NodeAddress) -> Result<(), CallError> {
        self.sync_requests.push(node);
        Ok(())
    }

    fn report_sync_lost(&mut self, node: NodeAddress) {
        self.synced.retain(|synced| *synced != node);
        self.sync_lost.push(node);
    }

    fn device_state(&self, node: NodeAddress) -> DeviceState {
        if self.synced.contains(&node) {
            DeviceState::Synced
        } else {
            DeviceState::Unsynced
        }
    }
}

impl RouteManagement for MockPlatform {
    fn set_node_available(&mut self, node: NodeAddress, available: bool) -> Result<(), CallError> {
        self.routes.push((node, available));
        Ok(())
    }
}

impl NodeDiscovery for MockPlatform {
    fn start(&mut self) -> Result<(), CallError> {
        self.discovery_running = true;
        self.discovery_starts += 1;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CallError> {
        self.discovery_running = false;
        self.discovery_stops += 1;
        Ok(())
    }
}

impl NetworkConfig for MockPlatform {
    fn set_network_config(
        &mut self,
        node: NodeAddress,
        mask: NetworkConfigMask,
        settings: &NetworkSettings,
    ) -> Result<(), CallError> {
        self.configs.push((node, mask, *settings));
        Ok(())
    }
}

/// Application that records every callback and attaches init scripts on welcome
#[derive(Default)]
pub struct RecordingApp<'a> {
    pub init_scripts: Vec<(NodeAddress, &'a [ScriptStep<'a>])>,
    pub reports: Vec<(Report, Option<NodeAddress>)>,
    pub script_results: Vec<(NodeAddress, ResultCode, ErrorInfo)>,
    pub sync_results: Vec<(NodeAddress, CommandResult)>,
    pub filter_results: Vec<(NodeAddress, CommandResult)>,
}

impl<'a> RecordingApp<'a> {
    pub fn with_init_script(address: NodeAddress, script: &'a [ScriptStep<'a>]) -> Self {
        Self {
            init_scripts: vec![(address, script)],
            ..Default::default()
        }
    }

    pub fn count(&self, report: Report) -> usize {
        self.reports.iter().filter(|(r, _)| *r == report).count()
    }
}

impl<'a> Application<'a> for RecordingApp<'a> {
    fn on_report(
        &mut self,
        report: Report,
        signature: Option<&Signature>,
        node: Option<&mut NodeRecord<'a>>,
    ) {
        self.reports.push((report, signature.map(|s| s.node_address)));
        if let Some(node) = node {
            let script = self
                .init_scripts
                .iter()
                .find(|(address, _)| *address == node.address());
            if let Some(&(_, script)) = script {
                node.set_init_script(script);
            }
        }
    }

    fn on_script_result(&mut self, address: NodeAddress, code: ResultCode, error_info: ErrorInfo) {
        self.script_results.push((address, code, error_info));
    }

    fn on_sync_result(&mut self, address: NodeAddress, result: CommandResult) {
        self.sync_results.push((address, result));
    }

    fn on_packet_filter_result(&mut self, address: NodeAddress, result: CommandResult) {
        self.filter_results.push((address, result));
    }
}

pub fn at(ms: u64) -> Instant {
    Instant::from_millis(ms)
}

pub fn signature(address: u16, position: u16) -> Signature {
    Signature {
        node_position: NodePosition::new(position),
        ..Signature::with_address(NodeAddress::new(address))
    }
}

pub fn observer<'a>(
    records: &[NodeRecord<'a>],
    app: RecordingApp<'a>,
    config: Config,
) -> Observer<'a> {
    let records = heapless::Vec::from_slice(records).unwrap();
    NodeObserver::new(MockPlatform::default(), app, records, config)
}

pub fn start(observer: &mut Observer<'_>, now: Instant) {
    observer.on_manager_state(SupervisorMode::Normal, StarterState::Ready, now);
}

/// Runs a complete discovery exchange that admits the node.
pub fn welcome(observer: &mut Observer<'_>, signature: &Signature, now: Instant) {
    use emmost::driver::message::{CheckResult, DiscoveryReport};

    assert_eq!(observer.on_discovery_evaluate(signature), CheckResult::Welcome);
    observer.on_discovery_report(DiscoveryReport::WelcomeSuccess, Some(signature), now);
}

/// Completes the pending remote sync of `address`.
pub fn complete_sync(observer: &mut Observer<'_>, address: NodeAddress, result: CommandResult) {
    if result.is_ok() {
        observer.platform_mut().synced.push(address);
    }
    observer.on_sync_result(address, result);
}

pub fn respond(observer: &mut Observer<'_>, source: NodeAddress, id: MessageId, payload: &[u8]) -> bool {
    observer.on_message(&Message {
        source,
        id,
        payload,
    })
}
