//! Pin a datagram socket to a physical network interface.
//!
//! When the head unit's own wireless hotspot becomes the OS default route,
//! packets addressed to it can leave through the wrong interface. The
//! binder looks for an active interface of the configured
//! [`TransportClass`] and binds the socket to it with `SO_BINDTODEVICE`.
//!
//! Binding is best effort. Every failure path (enumeration error, no
//! matching interface, bind refused, unsupported platform) leaves the
//! socket on the default route and returns [`BindOutcome::DefaultRoute`].

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::StreamError;

/// Kernel `ARPHRD_ETHER`.
const ARPHRD_ETHER: u32 = 1;
/// Kernel `ARPHRD_LOOPBACK`.
const ARPHRD_LOOPBACK: u32 = 772;
/// Name prefixes used by modem drivers for mobile data links.
const CELLULAR_PREFIXES: &[&str] = &["rmnet", "wwan", "ccmni", "ppp"];

// ── TransportClass ───────────────────────────────────────────────

/// Physical transport an interface runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportClass {
    Wifi,
    Ethernet,
    Cellular,
    Loopback,
    Other,
}

impl fmt::Display for TransportClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportClass::Wifi => write!(f, "WiFi"),
            TransportClass::Ethernet => write!(f, "Ethernet"),
            TransportClass::Cellular => write!(f, "Cellular"),
            TransportClass::Loopback => write!(f, "Loopback"),
            TransportClass::Other => write!(f, "Other"),
        }
    }
}

// ── Interface enumeration ────────────────────────────────────────

/// One network interface as seen by the binder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetInterface {
    pub name: String,
    pub class: TransportClass,
    pub active: bool,
}

/// Source of the current interface list.
pub trait InterfaceSource: Send + Sync {
    fn interfaces(&self) -> io::Result<Vec<NetInterface>>;
}

/// Reads interfaces from `/sys/class/net` (Linux and Android).
#[derive(Debug, Clone)]
pub struct SysfsInterfaces {
    root: PathBuf,
}

impl SysfsInterfaces {
    pub fn new() -> Self {
        Self::with_root("/sys/class/net")
    }

    /// Read from an alternative directory laid out like `/sys/class/net`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read_attr(dir: &Path, attr: &str) -> Option<String> {
        std::fs::read_to_string(dir.join(attr))
            .ok()
            .map(|s| s.trim().to_string())
    }

    fn classify(name: &str, dir: &Path) -> TransportClass {
        let arp_type = Self::read_attr(dir, "type").and_then(|t| t.parse::<u32>().ok());
        if arp_type == Some(ARPHRD_LOOPBACK) {
            return TransportClass::Loopback;
        }
        if dir.join("wireless").exists() || dir.join("phy80211").exists() {
            return TransportClass::Wifi;
        }
        if CELLULAR_PREFIXES.iter().any(|p| name.starts_with(p)) {
            return TransportClass::Cellular;
        }
        if arp_type == Some(ARPHRD_ETHER) {
            return TransportClass::Ethernet;
        }
        TransportClass::Other
    }

    fn is_active(dir: &Path) -> bool {
        match Self::read_attr(dir, "operstate").as_deref() {
            Some("up") => true,
            // Loopback and some tunnel drivers never report "up".
            Some("unknown") => Self::read_attr(dir, "carrier").as_deref() == Some("1"),
            _ => false,
        }
    }
}

impl Default for SysfsInterfaces {
    fn default() -> Self {
        Self::new()
    }
}

impl InterfaceSource for SysfsInterfaces {
    fn interfaces(&self) -> io::Result<Vec<NetInterface>> {
        let mut found = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let dir = entry.path();
            found.push(NetInterface {
                class: Self::classify(&name, &dir),
                active: Self::is_active(&dir),
                name,
            });
        }
        // read_dir order is unspecified; keep "first match" stable.
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }
}

// ── Socket binding ───────────────────────────────────────────────

/// Sockets that can be restricted to one interface.
pub trait BindToDevice {
    fn bind_to_device(&self, interface: &str) -> io::Result<()>;
}

#[cfg(any(target_os = "linux", target_os = "android"))]
mod sys {
    use std::ffi::CString;
    use std::io;
    use std::os::fd::AsRawFd;

    pub fn bind_to_device(socket: &impl AsRawFd, interface: &str) -> io::Result<()> {
        let name = CString::new(interface)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let bytes = name.as_bytes_with_nul();
        // SAFETY: the fd is owned by a live socket and `bytes` outlives the call.
        let rc = unsafe {
            libc::setsockopt(
                socket.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_BINDTODEVICE,
                bytes.as_ptr() as *const libc::c_void,
                bytes.len() as libc::socklen_t,
            )
        };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
mod sys {
    use std::io;

    pub fn bind_to_device<S>(_socket: &S, _interface: &str) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "interface binding is only available on Linux and Android",
        ))
    }
}

impl BindToDevice for std::net::UdpSocket {
    fn bind_to_device(&self, interface: &str) -> io::Result<()> {
        sys::bind_to_device(self, interface)
    }
}

impl BindToDevice for tokio::net::UdpSocket {
    fn bind_to_device(&self, interface: &str) -> io::Result<()> {
        sys::bind_to_device(self, interface)
    }
}

// ── BindOutcome ──────────────────────────────────────────────────

/// Result of a binding attempt. Never an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindOutcome {
    /// The socket routes exclusively through `interface`.
    Pinned {
        interface: String,
        class: TransportClass,
    },
    /// The socket stays on the OS default route.
    DefaultRoute { reason: String },
}

impl BindOutcome {
    pub fn is_pinned(&self) -> bool {
        matches!(self, BindOutcome::Pinned { .. })
    }

    /// Short suffix for status lines, e.g. `"(WiFi)"`.
    pub fn label(&self) -> String {
        match self {
            BindOutcome::Pinned { class, .. } => format!("({class})"),
            BindOutcome::DefaultRoute { .. } => "(default route)".to_string(),
        }
    }
}

// ── TransportBinder ──────────────────────────────────────────────

/// Chooses an interface of one transport class and pins sockets to it.
#[derive(Clone)]
pub struct TransportBinder {
    target: Option<TransportClass>,
    source: Arc<dyn InterfaceSource>,
}

impl TransportBinder {
    /// Pin to the first active interface of `target`.
    pub fn new(target: TransportClass) -> Self {
        Self::with_source(Some(target), Arc::new(SysfsInterfaces::new()))
    }

    /// Never pin; every socket uses the default route.
    pub fn default_route() -> Self {
        Self::with_source(None, Arc::new(SysfsInterfaces::new()))
    }

    pub fn with_source(target: Option<TransportClass>, source: Arc<dyn InterfaceSource>) -> Self {
        Self { target, source }
    }

    pub fn target(&self) -> Option<TransportClass> {
        self.target
    }

    /// First active interface of the target class, if any.
    pub fn select(&self) -> io::Result<Option<NetInterface>> {
        let Some(target) = self.target else {
            return Ok(None);
        };
        Ok(self
            .source
            .interfaces()?
            .into_iter()
            .find(|i| i.active && i.class == target))
    }

    /// Bind `socket` to the selected interface, falling back silently.
    pub fn bind<S: BindToDevice + ?Sized>(&self, socket: &S) -> BindOutcome {
        let Some(target) = self.target else {
            return BindOutcome::DefaultRoute {
                reason: "interface pinning disabled".into(),
            };
        };

        let iface = match self.select() {
            Ok(Some(iface)) => iface,
            Ok(None) => {
                debug!("no active {target} interface; using default route");
                return BindOutcome::DefaultRoute {
                    reason: format!("no active {target} interface"),
                };
            }
            Err(e) => {
                warn!("interface enumeration failed: {e}");
                return BindOutcome::DefaultRoute {
                    reason: format!("enumeration failed: {e}"),
                };
            }
        };

        match socket.bind_to_device(&iface.name) {
            Ok(()) => {
                info!("bound socket to {target} interface {}", iface.name);
                BindOutcome::Pinned {
                    interface: iface.name,
                    class: iface.class,
                }
            }
            Err(e) => {
                let err = StreamError::Bind(format!("{}: {e}", iface.name));
                warn!("{err}; using default route");
                BindOutcome::DefaultRoute {
                    reason: err.to_string(),
                }
            }
        }
    }
}

impl fmt::Debug for TransportBinder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportBinder")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    struct FixedInterfaces(io::Result<Vec<NetInterface>>);

    impl InterfaceSource for FixedInterfaces {
        fn interfaces(&self) -> io::Result<Vec<NetInterface>> {
            match &self.0 {
                Ok(list) => Ok(list.clone()),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            }
        }
    }

    #[derive(Default)]
    struct FakeSocket {
        refuse: bool,
        bound: Mutex<Vec<String>>,
    }

    impl BindToDevice for FakeSocket {
        fn bind_to_device(&self, interface: &str) -> io::Result<()> {
            if self.refuse {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "EPERM"));
            }
            self.bound.lock().unwrap().push(interface.to_string());
            Ok(())
        }
    }

    fn iface(name: &str, class: TransportClass, active: bool) -> NetInterface {
        NetInterface {
            name: name.into(),
            class,
            active,
        }
    }

    fn binder(list: Vec<NetInterface>) -> TransportBinder {
        TransportBinder::with_source(
            Some(TransportClass::Wifi),
            Arc::new(FixedInterfaces(Ok(list))),
        )
    }

    #[test]
    fn pins_first_active_match() {
        let b = binder(vec![
            iface("eth0", TransportClass::Ethernet, true),
            iface("wlan0", TransportClass::Wifi, false),
            iface("wlan1", TransportClass::Wifi, true),
            iface("wlan2", TransportClass::Wifi, true),
        ]);
        let sock = FakeSocket::default();
        let outcome = b.bind(&sock);
        assert_eq!(
            outcome,
            BindOutcome::Pinned {
                interface: "wlan1".into(),
                class: TransportClass::Wifi
            }
        );
        assert_eq!(outcome.label(), "(WiFi)");
        assert_eq!(*sock.bound.lock().unwrap(), vec!["wlan1".to_string()]);
    }

    #[test]
    fn no_match_falls_back() {
        let b = binder(vec![iface("eth0", TransportClass::Ethernet, true)]);
        let outcome = b.bind(&FakeSocket::default());
        assert!(!outcome.is_pinned());
        assert_eq!(outcome.label(), "(default route)");
    }

    #[test]
    fn enumeration_error_falls_back() {
        let b = TransportBinder::with_source(
            Some(TransportClass::Wifi),
            Arc::new(FixedInterfaces(Err(io::Error::new(
                io::ErrorKind::NotFound,
                "no sysfs",
            )))),
        );
        assert!(!b.bind(&FakeSocket::default()).is_pinned());
    }

    #[test]
    fn refused_bind_falls_back() {
        let b = binder(vec![iface("wlan0", TransportClass::Wifi, true)]);
        let sock = FakeSocket {
            refuse: true,
            ..Default::default()
        };
        match b.bind(&sock) {
            BindOutcome::DefaultRoute { reason } => assert!(reason.contains("wlan0")),
            other => panic!("expected fallback, got {other:?}"),
        }
    }

    #[test]
    fn disabled_pinning_never_touches_socket() {
        let b = TransportBinder::with_source(None, Arc::new(FixedInterfaces(Ok(vec![]))));
        let sock = FakeSocket::default();
        assert!(!b.bind(&sock).is_pinned());
        assert!(sock.bound.lock().unwrap().is_empty());
    }

    #[test]
    fn sysfs_classification() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let mk = |name: &str, kind: &str, oper: &str, extra: Option<&str>| {
            let d = root.join(name);
            std::fs::create_dir_all(&d).unwrap();
            std::fs::write(d.join("type"), format!("{kind}\n")).unwrap();
            std::fs::write(d.join("operstate"), format!("{oper}\n")).unwrap();
            if let Some(sub) = extra {
                std::fs::create_dir_all(d.join(sub)).unwrap();
            }
        };
        mk("lo", "772", "unknown", None);
        mk("eth0", "1", "down", None);
        mk("wlan0", "1", "up", Some("wireless"));
        mk("rmnet0", "519", "up", None);

        let list = SysfsInterfaces::with_root(root).interfaces().unwrap();
        let names: Vec<_> = list.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, ["eth0", "lo", "rmnet0", "wlan0"]);

        let by_name = |n: &str| list.iter().find(|i| i.name == n).unwrap().clone();
        assert_eq!(by_name("lo").class, TransportClass::Loopback);
        assert!(!by_name("lo").active);
        assert_eq!(by_name("eth0").class, TransportClass::Ethernet);
        assert!(!by_name("eth0").active);
        assert_eq!(by_name("wlan0").class, TransportClass::Wifi);
        assert!(by_name("wlan0").active);
        assert_eq!(by_name("rmnet0").class, TransportClass::Cellular);
    }

    #[test]
    fn missing_sysfs_root_is_an_error() {
        let src = SysfsInterfaces::with_root("/definitely/not/here");
        assert!(src.interfaces().is_err());
    }
}
