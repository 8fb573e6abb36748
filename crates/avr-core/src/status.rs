//! Status snapshots and sparse status updates

use serde::{Deserialize, Serialize};

use crate::driver::DriverEvent;

/// Complete record of every tracked status field for one device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    /// Main zone power
    pub on: bool,
    /// Master volume step
    pub volume: u32,
    /// Audio muting
    pub mute: bool,
    /// Selected input source token
    pub source: String,
    /// Listening mode token
    pub sound_mode: String,
}

/// A change touching a subset of status fields
///
/// `None` means "keep whatever the snapshot holds".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mute: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sound_mode: Option<String>,
}

impl StatusUpdate {
    /// True when the update touches no field at all
    pub fn is_empty(&self) -> bool {
        self.on.is_none()
            && self.volume.is_none()
            && self.mute.is_none()
            && self.source.is_none()
            && self.sound_mode.is_none()
    }

    /// Shallow-merge this update over a snapshot; new values win
    pub fn apply(&self, base: &Status) -> Status {
        Status {
            on: self.on.unwrap_or(base.on),
            volume: self.volume.unwrap_or(base.volume),
            mute: self.mute.unwrap_or(base.mute),
            source: self.source.clone().unwrap_or_else(|| base.source.clone()),
            sound_mode: self
                .sound_mode
                .clone()
                .unwrap_or_else(|| base.sound_mode.clone()),
        }
    }
}

impl From<DriverEvent> for StatusUpdate {
    fn from(event: DriverEvent) -> Self {
        let mut update = StatusUpdate::default();
        match event {
            DriverEvent::Power(on) => update.on = Some(on),
            DriverEvent::Volume(volume) => update.volume = Some(volume),
            DriverEvent::Mute(mute) => update.mute = Some(mute),
            DriverEvent::Source(source) => update.source = Some(source),
            DriverEvent::SoundMode(mode) => update.sound_mode = Some(mode),
        }
        update
    }
}
