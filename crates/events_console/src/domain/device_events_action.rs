use common::domain::MonitorParams;

use super::DecoderInfoParams;

/// Actions the events view can dispatch
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEventsAction {
    StartEventsMonitoring(MonitorParams),
    StopEventsMonitoring,
    ClearEventsMonitoring,
    SetDecoderInfo(DecoderInfoParams),
    SetDefaultDecodeInfo,
}
