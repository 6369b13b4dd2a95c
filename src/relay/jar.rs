use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use axum_extra::extract::cookie::Cookie;
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

const SHARED_CALLER: &str = "shared";

/// Identifies whoever the relay is acting for: an HTTP client's relay
/// session, or an MCP session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallerId(String);

impl CallerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn shared() -> Self {
        Self(SHARED_CALLER.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How jars are keyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JarScope {
    /// One jar per caller.
    #[default]
    PerCaller,
    /// Every caller shares one jar. Only sound for a single logical user.
    Shared,
}

impl FromStr for JarScope {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "per-caller" | "per_caller" => Ok(Self::PerCaller),
            "shared" => Ok(Self::Shared),
            other => Err(format!("expected `per-caller` or `shared`, got `{other}`")),
        }
    }
}

/// Cookies the relay replays to the backend for one caller. Values are
/// opaque to the relay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionJar {
    cookies: Vec<(String, String)>,
}

impl SessionJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a jar from `Set-Cookie` response header values. Removal
    /// cookies (empty value or non-positive max-age) drop earlier entries.
    pub fn from_set_cookie<'a>(headers: impl IntoIterator<Item = &'a str>) -> Self {
        let mut jar = Self::new();
        for raw in headers {
            match Cookie::parse(raw) {
                Ok(cookie) => {
                    let expired = cookie
                        .max_age()
                        .is_some_and(|age| age.is_zero() || age.is_negative());
                    if cookie.value().is_empty() || expired {
                        jar.remove(cookie.name());
                    } else {
                        jar.insert(cookie.name(), cookie.value());
                    }
                }
                Err(err) => debug!(error = %err, "Ignoring malformed Set-Cookie header"),
            }
        }
        jar
    }

    pub fn insert(&mut self, name: &str, value: &str) {
        match self.cookies.iter_mut().find(|(existing, _)| existing == name) {
            Some((_, slot)) => *slot = value.to_string(),
            None => self.cookies.push((name.to_string(), value.to_string())),
        }
    }

    pub fn remove(&mut self, name: &str) {
        self.cookies.retain(|(existing, _)| existing != name);
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    /// Value for an outgoing `Cookie` header, if there is anything to send.
    pub fn to_header(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        let pairs: Vec<String> = self
            .cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect();
        Some(pairs.join("; "))
    }
}

/// Jars held by the relay, one per caller key.
///
/// Caller ids are issued by the store; surfaces only act on ids the store
/// knows, so a client can never pick the key another caller's login lands on.
pub trait JarStore: Send + Sync {
    /// Registers a fresh caller with an empty jar.
    fn issue(&self) -> CallerId;

    /// Whether `caller` is registered and has not idled out.
    fn contains(&self, caller: &CallerId) -> bool;

    fn get(&self, caller: &CallerId) -> SessionJar;

    /// Replaces the caller's jar wholesale.
    fn replace(&self, caller: &CallerId, jar: SessionJar);

    /// Stores `jar` under a freshly issued caller and forgets `from`.
    fn rotate(&self, from: &CallerId, jar: SessionJar) -> CallerId;

    /// Empties the caller's jar. The caller stays registered.
    fn clear(&self, caller: &CallerId);

    /// Forgets the caller and its jar.
    fn remove(&self, caller: &CallerId);

    /// Number of callers currently holding a non-empty jar.
    fn active_sessions(&self) -> usize;
}

pub const DEFAULT_JAR_IDLE_TTL: Duration = Duration::from_secs(8 * 60 * 60);

#[derive(Debug)]
struct Entry {
    jar: SessionJar,
    last_used: Instant,
}

impl Entry {
    fn new(jar: SessionJar) -> Self {
        Self {
            jar,
            last_used: Instant::now(),
        }
    }
}

/// Process-local store. Callers unused for longer than the idle TTL are
/// treated as unknown and swept whenever a caller is issued or a jar stored.
#[derive(Debug)]
pub struct MemoryJarStore {
    entries: DashMap<CallerId, Entry>,
    idle_ttl: Duration,
}

impl MemoryJarStore {
    pub fn new() -> Self {
        Self::with_idle_ttl(DEFAULT_JAR_IDLE_TTL)
    }

    pub fn with_idle_ttl(idle_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            idle_ttl,
        }
    }

    fn sweep(&self) {
        let ttl = self.idle_ttl;
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.last_used.elapsed() < ttl);
        let swept = before.saturating_sub(self.entries.len());
        if swept > 0 {
            debug!(swept, "Swept idle relay sessions");
        }
    }

    fn live(&self, entry: &Entry) -> bool {
        entry.last_used.elapsed() < self.idle_ttl
    }
}

impl Default for MemoryJarStore {
    fn default() -> Self {
        Self::new()
    }
}

impl JarStore for MemoryJarStore {
    fn issue(&self) -> CallerId {
        self.sweep();
        let caller = CallerId::generate();
        self.entries.insert(caller.clone(), Entry::new(SessionJar::new()));
        caller
    }

    fn contains(&self, caller: &CallerId) -> bool {
        self.entries
            .get(caller)
            .is_some_and(|entry| self.live(&entry))
    }

    fn get(&self, caller: &CallerId) -> SessionJar {
        match self.entries.get_mut(caller) {
            Some(mut entry) if self.live(&entry) => {
                entry.last_used = Instant::now();
                entry.jar.clone()
            }
            _ => SessionJar::new(),
        }
    }

    fn replace(&self, caller: &CallerId, jar: SessionJar) {
        self.sweep();
        self.entries.insert(caller.clone(), Entry::new(jar));
    }

    fn rotate(&self, from: &CallerId, jar: SessionJar) -> CallerId {
        self.entries.remove(from);
        self.sweep();
        let caller = CallerId::generate();
        self.entries.insert(caller.clone(), Entry::new(jar));
        caller
    }

    fn clear(&self, caller: &CallerId) {
        if let Some(mut entry) = self.entries.get_mut(caller) {
            entry.jar = SessionJar::new();
            entry.last_used = Instant::now();
        }
    }

    fn remove(&self, caller: &CallerId) {
        self.entries.remove(caller);
    }

    fn active_sessions(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| !entry.jar.is_empty() && self.live(&entry))
            .count()
    }
}
