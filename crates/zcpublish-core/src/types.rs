//! Core types describing the local audio endpoints that get announced.
//!
//! An endpoint is owned by whatever registry the host application keeps
//! (sinks and sources); this crate only describes the data the announcer
//! reads from it: identity, naming and the sample specification that ends
//! up in the TXT record.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Stable identity of an endpoint inside the owning registry.
///
/// Identities are assigned by the host application and never reused while
/// the endpoint is alive, which makes them safe to use as map keys in place
/// of a reference to the endpoint itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointId(pub u32);

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u32> for EndpointId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Direction of an audio endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointKind {
    /// Playback device
    Sink,
    /// Capture device
    Source,
}

impl EndpointKind {
    /// DNS-SD service type announced for endpoints of this kind.
    pub fn service_type(&self) -> &'static str {
        match self {
            EndpointKind::Sink => SERVICE_TYPE_SINK,
            EndpointKind::Source => SERVICE_TYPE_SOURCE,
        }
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointKind::Sink => write!(f, "sink"),
            EndpointKind::Source => write!(f, "source"),
        }
    }
}

/// Service type for playback endpoints.
pub const SERVICE_TYPE_SINK: &str = "_pulse-sink._tcp";

/// Service type for capture endpoints.
pub const SERVICE_TYPE_SOURCE: &str = "_pulse-source._tcp";

/// Service type for the server itself.
pub const SERVICE_TYPE_SERVER: &str = "_pulse-server._tcp";

/// Default port of the native protocol.
pub const DEFAULT_NATIVE_PORT: u16 = 4713;

/// PCM sample encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleFormat {
    #[serde(rename = "u8")]
    U8,
    #[serde(rename = "aLaw")]
    ALaw,
    #[serde(rename = "uLaw")]
    ULaw,
    #[serde(rename = "s16le")]
    S16Le,
    #[serde(rename = "s16be")]
    S16Be,
    #[serde(rename = "float32le")]
    Float32Le,
    #[serde(rename = "float32be")]
    Float32Be,
    #[serde(rename = "s32le")]
    S32Le,
    #[serde(rename = "s32be")]
    S32Be,
    #[serde(rename = "s24le")]
    S24Le,
    #[serde(rename = "s24be")]
    S24Be,
    #[serde(rename = "s24-32le")]
    S24In32Le,
    #[serde(rename = "s24-32be")]
    S24In32Be,
}

impl SampleFormat {
    /// Returns the canonical short name used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            SampleFormat::U8 => "u8",
            SampleFormat::ALaw => "aLaw",
            SampleFormat::ULaw => "uLaw",
            SampleFormat::S16Le => "s16le",
            SampleFormat::S16Be => "s16be",
            SampleFormat::Float32Le => "float32le",
            SampleFormat::Float32Be => "float32be",
            SampleFormat::S32Le => "s32le",
            SampleFormat::S32Be => "s32be",
            SampleFormat::S24Le => "s24le",
            SampleFormat::S24Be => "s24be",
            SampleFormat::S24In32Le => "s24-32le",
            SampleFormat::S24In32Be => "s24-32be",
        }
    }
}

impl Default for SampleFormat {
    fn default() -> Self {
        SampleFormat::S16Le
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sample format, rate and channel count of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SampleSpec {
    pub format: SampleFormat,
    pub rate: u32,
    pub channels: u8,
}

impl SampleSpec {
    /// Creates a sample spec.
    pub fn new(format: SampleFormat, rate: u32, channels: u8) -> Self {
        Self {
            format,
            rate,
            channels,
        }
    }

    /// Checks that rate and channel count are usable.
    pub fn validate(&self) -> Result<(), String> {
        if self.rate == 0 {
            return Err("sample rate cannot be 0".to_string());
        }
        if self.channels == 0 {
            return Err("channel count cannot be 0".to_string());
        }
        if usize::from(self.channels) > ChannelMap::MAX_CHANNELS {
            return Err(format!(
                "channel count {} exceeds maximum of {}",
                self.channels,
                ChannelMap::MAX_CHANNELS
            ));
        }
        Ok(())
    }
}

impl Default for SampleSpec {
    fn default() -> Self {
        Self::new(SampleFormat::S16Le, 44100, 2)
    }
}

/// Speaker position of a single channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelPosition {
    Mono,
    FrontLeft,
    FrontRight,
    FrontCenter,
    RearLeft,
    RearRight,
    RearCenter,
    Lfe,
    SideLeft,
    SideRight,
    Aux(u8),
}

impl fmt::Display for ChannelPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelPosition::Mono => f.write_str("mono"),
            ChannelPosition::FrontLeft => f.write_str("front-left"),
            ChannelPosition::FrontRight => f.write_str("front-right"),
            ChannelPosition::FrontCenter => f.write_str("front-center"),
            ChannelPosition::RearLeft => f.write_str("rear-left"),
            ChannelPosition::RearRight => f.write_str("rear-right"),
            ChannelPosition::RearCenter => f.write_str("rear-center"),
            ChannelPosition::Lfe => f.write_str("lfe"),
            ChannelPosition::SideLeft => f.write_str("side-left"),
            ChannelPosition::SideRight => f.write_str("side-right"),
            ChannelPosition::Aux(n) => write!(f, "aux{}", n),
        }
    }
}

impl FromStr for ChannelPosition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let position = match s {
            "mono" => ChannelPosition::Mono,
            "front-left" | "left" => ChannelPosition::FrontLeft,
            "front-right" | "right" => ChannelPosition::FrontRight,
            "front-center" | "center" => ChannelPosition::FrontCenter,
            "rear-left" => ChannelPosition::RearLeft,
            "rear-right" => ChannelPosition::RearRight,
            "rear-center" => ChannelPosition::RearCenter,
            "lfe" | "subwoofer" => ChannelPosition::Lfe,
            "side-left" => ChannelPosition::SideLeft,
            "side-right" => ChannelPosition::SideRight,
            other => {
                let index = other
                    .strip_prefix("aux")
                    .and_then(|n| n.parse::<u8>().ok())
                    .ok_or_else(|| format!("unknown channel position '{}'", other))?;
                ChannelPosition::Aux(index)
            }
        };
        Ok(position)
    }
}

impl Serialize for ChannelPosition {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ChannelPosition {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Ordered speaker layout of an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelMap(Vec<ChannelPosition>);

impl ChannelMap {
    /// Largest channel count a map can describe.
    pub const MAX_CHANNELS: usize = 32;

    /// Creates a map from explicit positions.
    pub fn new(positions: Vec<ChannelPosition>) -> Self {
        Self(positions)
    }

    /// Derives the conventional layout for a channel count.
    pub fn default_for(channels: u8) -> Self {
        use ChannelPosition::*;

        let positions = match channels {
            1 => vec![Mono],
            2 => vec![FrontLeft, FrontRight],
            3 => vec![FrontLeft, FrontRight, FrontCenter],
            4 => vec![FrontLeft, FrontRight, RearLeft, RearRight],
            5 => vec![FrontLeft, FrontRight, RearLeft, RearRight, FrontCenter],
            6 => vec![FrontLeft, FrontRight, RearLeft, RearRight, FrontCenter, Lfe],
            8 => vec![
                FrontLeft,
                FrontRight,
                RearLeft,
                RearRight,
                FrontCenter,
                Lfe,
                SideLeft,
                SideRight,
            ],
            n => (0..n).map(Aux).collect(),
        };

        Self(positions)
    }

    /// Number of channels described.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ChannelMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, position) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", position)?;
        }
        Ok(())
    }
}

/// Snapshot of an endpoint as the announcer sees it.
///
/// # Examples
///
/// ```
/// use zcpublish_core::types::{Endpoint, EndpointKind};
///
/// let sink = Endpoint::builder(7, EndpointKind::Sink, "alsa_output.pci")
///     .description("Built-in Audio")
///     .rate(44100)
///     .channels(2)
///     .build();
///
/// assert_eq!(sink.display_label(), "Built-in Audio");
/// assert_eq!(sink.channel_map.to_string(), "front-left,front-right");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: EndpointId,
    pub kind: EndpointKind,
    /// Bare device name, unique within the owning registry
    pub name: String,
    /// Human readable description, if the device has one
    pub description: Option<String>,
    pub sample_spec: SampleSpec,
    pub channel_map: ChannelMap,
}

impl Endpoint {
    /// Starts building an endpoint with a stereo 44.1 kHz default spec.
    pub fn builder(id: u32, kind: EndpointKind, name: impl Into<String>) -> EndpointBuilder {
        EndpointBuilder::new(id, kind, name)
    }

    /// Label used when composing the announced service name.
    ///
    /// Falls back to the bare name when there is no description.
    pub fn display_label(&self) -> &str {
        self.description.as_deref().unwrap_or(&self.name)
    }

    /// Reference used to key this endpoint without borrowing it.
    pub fn reference(&self) -> EndpointRef {
        EndpointRef {
            id: self.id,
            kind: self.kind,
        }
    }
}

/// Identity of an endpoint plus its direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointRef {
    pub id: EndpointId,
    pub kind: EndpointKind,
}

impl fmt::Display for EndpointRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}

/// Builder for [`Endpoint`].
#[derive(Debug, Clone)]
pub struct EndpointBuilder {
    id: EndpointId,
    kind: EndpointKind,
    name: String,
    description: Option<String>,
    sample_spec: SampleSpec,
    channel_map: Option<ChannelMap>,
}

impl EndpointBuilder {
    pub fn new(id: u32, kind: EndpointKind, name: impl Into<String>) -> Self {
        Self {
            id: EndpointId(id),
            kind,
            name: name.into(),
            description: None,
            sample_spec: SampleSpec::default(),
            channel_map: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn format(mut self, format: SampleFormat) -> Self {
        self.sample_spec.format = format;
        self
    }

    pub fn rate(mut self, rate: u32) -> Self {
        self.sample_spec.rate = rate;
        self
    }

    pub fn channels(mut self, channels: u8) -> Self {
        self.sample_spec.channels = channels;
        self
    }

    pub fn channel_map(mut self, map: ChannelMap) -> Self {
        self.channel_map = Some(map);
        self
    }

    /// Builds the endpoint, deriving a channel map when none was given.
    pub fn build(self) -> Endpoint {
        let channel_map = self
            .channel_map
            .unwrap_or_else(|| ChannelMap::default_for(self.sample_spec.channels));

        Endpoint {
            id: self.id,
            kind: self.kind,
            name: self.name,
            description: self.description,
            sample_spec: self.sample_spec,
            channel_map,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_label_falls_back_to_name() {
        let endpoint = Endpoint::builder(1, EndpointKind::Source, "alsa_input.usb").build();
        assert_eq!(endpoint.display_label(), "alsa_input.usb");

        let endpoint = Endpoint::builder(1, EndpointKind::Source, "alsa_input.usb")
            .description("USB Microphone")
            .build();
        assert_eq!(endpoint.display_label(), "USB Microphone");
    }

    #[test]
    fn test_default_channel_maps() {
        assert_eq!(ChannelMap::default_for(1).to_string(), "mono");
        assert_eq!(
            ChannelMap::default_for(6).to_string(),
            "front-left,front-right,rear-left,rear-right,front-center,lfe"
        );
        assert_eq!(ChannelMap::default_for(3).len(), 3);
        assert_eq!(ChannelMap::default_for(7).to_string(), "aux0,aux1,aux2,aux3,aux4,aux5,aux6");
    }

    #[test]
    fn test_channel_position_parsing() {
        assert_eq!("front-left".parse::<ChannelPosition>(), Ok(ChannelPosition::FrontLeft));
        assert_eq!("aux12".parse::<ChannelPosition>(), Ok(ChannelPosition::Aux(12)));
        assert!("nowhere".parse::<ChannelPosition>().is_err());
    }

    #[test]
    fn test_sample_format_serde_names() {
        let json = serde_json::to_string(&SampleFormat::S24In32Le).unwrap();
        assert_eq!(json, "\"s24-32le\"");

        let format: SampleFormat = serde_json::from_str("\"float32be\"").unwrap();
        assert_eq!(format, SampleFormat::Float32Be);
        assert_eq!(format.to_string(), "float32be");
    }

    #[test]
    fn test_sample_spec_validation() {
        assert!(SampleSpec::new(SampleFormat::U8, 8000, 1).validate().is_ok());
        assert!(SampleSpec::new(SampleFormat::U8, 0, 1).validate().is_err());
        assert!(SampleSpec::new(SampleFormat::U8, 8000, 0).validate().is_err());
        assert!(SampleSpec::new(SampleFormat::U8, 8000, 33).validate().is_err());
    }

    #[test]
    fn test_service_types() {
        assert_eq!(EndpointKind::Sink.service_type(), "_pulse-sink._tcp");
        assert_eq!(EndpointKind::Source.service_type(), "_pulse-source._tcp");
    }
}
