//! Infrared capture/replay command layer.
//!
//! The IR codec and the recording filesystem are external collaborators
//! behind [`IrTransceiver`] and [`RecordingStore`]. This module owns what
//! sits between them and the paired controller: the text format recordings
//! are stored in, and the command grammar spoken over the discovery
//! channel (`capture <name>`, `replay <name>`, `exists <name>`).

use log::{info, warn};
use std::fmt;

/// Prefix of the stored recording text format.
const RAW_PREFIX: &str = "raw_array:[";

/// Reply for a command that completed.
pub const REPLY_OK: &str = "OK";

/// Reply when the named recording does not exist.
pub const REPLY_MISSING: &str = "MISSING";

/// Reply when a command could not be carried out.
pub const REPLY_ERR: &str = "ERR";

/// IR layer failures.
#[derive(Debug)]
pub enum IrError {
    /// Recording name would escape the store (path separators and the like).
    InvalidName(String),
    /// A stored recording did not parse as pulse timings.
    CorruptRecording(String),
    /// Collaborator I/O failure.
    Io(std::io::Error),
}

impl fmt::Display for IrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidName(name) => write!(f, "invalid recording name {:?}", name),
            Self::CorruptRecording(name) => write!(f, "corrupt recording {:?}", name),
            Self::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for IrError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for IrError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Recording persistence collaborator (SD card on the device, a plain
/// directory on the host).
pub trait RecordingStore {
    fn create(&mut self, name: &str, text: &str) -> Result<(), IrError>;
    fn read(&self, name: &str) -> Result<Option<String>, IrError>;
    fn exists(&self, name: &str) -> bool;
}

/// Raw-pulse capture/replay collaborator (the vendor IR driver).
pub trait IrTransceiver {
    /// One pending captured signal, as raw pulse timings in microseconds.
    fn capture(&mut self) -> Option<Vec<u16>>;

    /// Transmit raw pulse timings.
    fn replay(&mut self, pulses: &[u16]) -> Result<(), IrError>;
}

/// Encode raw pulse timings into the stored text form.
pub fn encode_raw(pulses: &[u16]) -> String {
    let mut text = String::from(RAW_PREFIX);
    for (i, pulse) in pulses.iter().enumerate() {
        if i > 0 {
            text.push(',');
        }
        text.push_str(&pulse.to_string());
    }
    text.push(']');
    text
}

/// Decode the stored text form back into pulse timings.
pub fn decode_raw(text: &str) -> Option<Vec<u16>> {
    let body = text.strip_prefix(RAW_PREFIX)?;
    let body = body.split(']').next()?;
    if body.is_empty() {
        return Some(Vec::new());
    }
    body.split(',')
        .map(|field| field.trim().parse::<u16>().ok())
        .collect()
}

/// Commands a paired controller can send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Capture(String),
    Replay(String),
    Exists(String),
    /// Anything unrecognized; echoed with `OK` like the original firmware.
    Other(String),
}

impl Command {
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        match trimmed.split_once(' ') {
            Some(("capture", name)) if !name.trim().is_empty() => {
                Self::Capture(name.trim().to_string())
            }
            Some(("replay", name)) if !name.trim().is_empty() => {
                Self::Replay(name.trim().to_string())
            }
            Some(("exists", name)) if !name.trim().is_empty() => {
                Self::Exists(name.trim().to_string())
            }
            _ => Self::Other(trimmed.to_string()),
        }
    }
}

/// Capture/replay service wired to the two collaborators.
pub struct IrService<T: IrTransceiver, S: RecordingStore> {
    transceiver: T,
    store: S,
}

impl<T: IrTransceiver, S: RecordingStore> IrService<T, S> {
    pub fn new(transceiver: T, store: S) -> Self {
        Self { transceiver, store }
    }

    /// Capture one signal and store it under `name`. Returns false when no
    /// signal is pending, which is an expected state, not an error.
    pub fn capture_to(&mut self, name: &str) -> Result<bool, IrError> {
        validate_name(name)?;
        let Some(pulses) = self.transceiver.capture() else {
            return Ok(false);
        };
        info!("captured {} pulses into {:?}", pulses.len(), name);
        self.store.create(name, &encode_raw(&pulses))?;
        Ok(true)
    }

    /// Replay the recording stored under `name`. Returns false when the
    /// recording does not exist.
    pub fn replay_from(&mut self, name: &str) -> Result<bool, IrError> {
        validate_name(name)?;
        let Some(text) = self.store.read(name)? else {
            return Ok(false);
        };
        let pulses =
            decode_raw(&text).ok_or_else(|| IrError::CorruptRecording(name.to_string()))?;
        info!("replaying {} pulses from {:?}", pulses.len(), name);
        self.transceiver.replay(&pulses)?;
        Ok(true)
    }

    pub fn exists(&self, name: &str) -> bool {
        validate_name(name).is_ok() && self.store.exists(name)
    }

    /// Execute one controller message and produce the reply payload.
    pub fn execute(&mut self, input: &str) -> String {
        match Command::parse(input) {
            Command::Capture(name) => match self.capture_to(&name) {
                Ok(true) => REPLY_OK.to_string(),
                Ok(false) => REPLY_MISSING.to_string(),
                Err(e) => {
                    warn!("capture {:?} failed: {}", name, e);
                    REPLY_ERR.to_string()
                }
            },
            Command::Replay(name) => match self.replay_from(&name) {
                Ok(true) => REPLY_OK.to_string(),
                Ok(false) => REPLY_MISSING.to_string(),
                Err(e) => {
                    warn!("replay {:?} failed: {}", name, e);
                    REPLY_ERR.to_string()
                }
            },
            Command::Exists(name) => {
                if self.exists(&name) {
                    REPLY_OK.to_string()
                } else {
                    REPLY_MISSING.to_string()
                }
            }
            Command::Other(text) => {
                info!("controller message: {:?}", text);
                REPLY_OK.to_string()
            }
        }
    }
}

fn validate_name(name: &str) -> Result<(), IrError> {
    if name.is_empty() || name.contains(['/', '\\', '.']) {
        return Err(IrError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Recording store backed by a directory.
pub struct DirStore {
    root: std::path::PathBuf,
}

impl DirStore {
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, name: &str) -> std::path::PathBuf {
        self.root.join(name)
    }
}

impl RecordingStore for DirStore {
    fn create(&mut self, name: &str, text: &str) -> Result<(), IrError> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::write(self.path(name), text)?;
        Ok(())
    }

    fn read(&self, name: &str) -> Result<Option<String>, IrError> {
        match std::fs::read_to_string(self.path(name)) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&self, name: &str) -> bool {
        self.path(name).exists()
    }
}

/// Transceiver placeholder for builds without the vendor IR driver wired
/// in: captures nothing and logs replays.
#[derive(Debug, Default)]
pub struct NullTransceiver;

impl IrTransceiver for NullTransceiver {
    fn capture(&mut self) -> Option<Vec<u16>> {
        None
    }

    fn replay(&mut self, pulses: &[u16]) -> Result<(), IrError> {
        info!("IR replay of {} pulses (no transmitter wired)", pulses.len());
        Ok(())
    }
}

#[cfg(test)]
pub use mock::MockTransceiver;

#[cfg(test)]
mod mock {
    use super::{IrError, IrTransceiver};
    use std::collections::VecDeque;

    /// Transceiver with scripted captures and recorded replays.
    #[derive(Debug, Default)]
    pub struct MockTransceiver {
        pub pending: VecDeque<Vec<u16>>,
        pub replayed: Vec<Vec<u16>>,
    }

    impl MockTransceiver {
        pub fn with_pending(pulses: Vec<u16>) -> Self {
            Self {
                pending: VecDeque::from([pulses]),
                replayed: Vec::new(),
            }
        }
    }

    impl IrTransceiver for MockTransceiver {
        fn capture(&mut self) -> Option<Vec<u16>> {
            self.pending.pop_front()
        }

        fn replay(&mut self, pulses: &[u16]) -> Result<(), IrError> {
            self.replayed.push(pulses.to_vec());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// In-memory store for tests.
    #[derive(Default)]
    struct MapStore {
        files: HashMap<String, String>,
    }

    impl RecordingStore for MapStore {
        fn create(&mut self, name: &str, text: &str) -> Result<(), IrError> {
            self.files.insert(name.to_string(), text.to_string());
            Ok(())
        }

        fn read(&self, name: &str) -> Result<Option<String>, IrError> {
            Ok(self.files.get(name).cloned())
        }

        fn exists(&self, name: &str) -> bool {
            self.files.contains_key(name)
        }
    }

    #[test]
    fn test_encode_matches_stored_format() {
        assert_eq!(encode_raw(&[9000, 4500, 560]), "raw_array:[9000,4500,560]");
        assert_eq!(encode_raw(&[]), "raw_array:[]");
    }

    #[test]
    fn test_decode_roundtrip() {
        let pulses = vec![9000, 4500, 560, 560, 1690];
        assert_eq!(decode_raw(&encode_raw(&pulses)), Some(pulses));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert_eq!(decode_raw("not a recording"), None);
        assert_eq!(decode_raw("raw_array:[1,two,3]"), None);
    }

    #[test]
    fn test_capture_stores_encoded_recording() {
        let mut service =
            IrService::new(MockTransceiver::with_pending(vec![100, 200]), MapStore::default());
        assert!(service.capture_to("power").unwrap());
        assert!(service.exists("power"));
        assert_eq!(service.execute("exists power"), REPLY_OK);
    }

    #[test]
    fn test_capture_with_no_signal_pending() {
        let mut service = IrService::new(MockTransceiver::default(), MapStore::default());
        assert!(!service.capture_to("power").unwrap());
        assert_eq!(service.execute("capture power"), REPLY_MISSING);
    }

    #[test]
    fn test_replay_sends_stored_pulses() {
        let mut service =
            IrService::new(MockTransceiver::with_pending(vec![100, 200]), MapStore::default());
        service.capture_to("power").unwrap();
        assert!(service.replay_from("power").unwrap());
        assert_eq!(service.transceiver.replayed, vec![vec![100, 200]]);
    }

    #[test]
    fn test_replay_missing_recording() {
        let mut service = IrService::new(MockTransceiver::default(), MapStore::default());
        assert!(!service.replay_from("nope").unwrap());
        assert_eq!(service.execute("replay nope"), REPLY_MISSING);
    }

    #[test]
    fn test_corrupt_recording_is_an_error() {
        let mut store = MapStore::default();
        store.create("bad", "raw_array:[1,junk]").unwrap();
        let mut service = IrService::new(MockTransceiver::default(), store);
        assert!(matches!(
            service.replay_from("bad"),
            Err(IrError::CorruptRecording(_))
        ));
        assert_eq!(service.execute("replay bad"), REPLY_ERR);
    }

    #[test]
    fn test_path_escaping_names_rejected() {
        let mut service = IrService::new(MockTransceiver::default(), MapStore::default());
        assert!(matches!(
            service.capture_to("../etc"),
            Err(IrError::InvalidName(_))
        ));
        assert!(!service.exists("a/b"));
    }

    #[test]
    fn test_unknown_message_echoes_ok() {
        let mut service = IrService::new(MockTransceiver::default(), MapStore::default());
        assert_eq!(service.execute("hello there"), REPLY_OK);
        assert_eq!(service.execute(""), REPLY_OK);
    }

    #[test]
    fn test_command_parse() {
        assert_eq!(
            Command::parse("capture tv-power"),
            Command::Capture("tv-power".to_string())
        );
        assert_eq!(
            Command::parse("  replay tv-power  "),
            Command::Replay("tv-power".to_string())
        );
        assert_eq!(Command::parse("capture "), Command::Other("capture".to_string()));
        assert_eq!(Command::parse("ping"), Command::Other("ping".to_string()));
    }
}
