//! Packet listeners and the checkers that select them.

use crate::connection::Connection;
use craftwire_protocol::{Packet, PacketDef};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Failure reported by a listener. Logged and counted, never propagated.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

pub type ListenerResult = Result<(), ListenerError>;

type Handler =
    dyn Fn(Arc<Connection>, Arc<Packet>) -> BoxFuture<'static, ListenerResult> + Send + Sync;

/// An async callback run for matching packets.
///
/// Clones share identity: registering a clone of an already registered
/// listener is rejected, and unregistering any clone removes it.
#[derive(Clone)]
pub struct Listener {
    name: Arc<str>,
    handler: Arc<Handler>,
}

impl Listener {
    pub fn new<F, Fut>(name: impl Into<Arc<str>>, f: F) -> Self
    where
        F: Fn(Arc<Connection>, Arc<Packet>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ListenerResult> + Send + 'static,
    {
        Self {
            name: name.into(),
            handler: Arc::new(move |conn, packet| f(conn, packet).boxed()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(
        &self,
        conn: Arc<Connection>,
        packet: Arc<Packet>,
    ) -> BoxFuture<'static, ListenerResult> {
        (self.handler)(conn, packet)
    }

    /// Returns whether both handles refer to the same listener.
    pub fn ptr_eq(&self, other: &Listener) -> bool {
        Arc::ptr_eq(&self.handler, &other.handler)
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Listener").field(&self.name).finish()
    }
}

/// Decides whether a listener runs for a packet. A listener's checkers are
/// OR-combined.
#[derive(Clone)]
pub enum Checker {
    /// Packets of one definition.
    Packet(Arc<PacketDef>),
    /// Packets whose ID, resolved for the connection's version, equals this.
    Id(i32),
    Predicate(Arc<dyn Fn(&Packet) -> bool + Send + Sync>),
    ConnPredicate(Arc<dyn Fn(&Connection, &Packet) -> bool + Send + Sync>),
}

impl Checker {
    pub fn packet(def: &Arc<PacketDef>) -> Self {
        Checker::Packet(def.clone())
    }

    pub fn id(id: i32) -> Self {
        Checker::Id(id)
    }

    pub fn predicate(f: impl Fn(&Packet) -> bool + Send + Sync + 'static) -> Self {
        Checker::Predicate(Arc::new(f))
    }

    pub fn conn_predicate(
        f: impl Fn(&Connection, &Packet) -> bool + Send + Sync + 'static,
    ) -> Self {
        Checker::ConnPredicate(Arc::new(f))
    }

    /// Accepts every packet.
    pub fn any() -> Self {
        Checker::predicate(|_| true)
    }

    pub fn matches(&self, conn: &Connection, packet: &Packet) -> bool {
        match self {
            Checker::Packet(def) => packet.is(def),
            Checker::Id(id) => {
                matches!(packet.id(&conn.version()), Ok(Some(resolved)) if resolved == *id)
            }
            Checker::Predicate(f) => f(packet),
            Checker::ConnPredicate(f) => f(conn, packet),
        }
    }
}

impl From<&Arc<PacketDef>> for Checker {
    fn from(def: &Arc<PacketDef>) -> Self {
        Checker::packet(def)
    }
}

impl fmt::Debug for Checker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Checker::Packet(def) => write!(f, "Packet({})", def.name()),
            Checker::Id(id) => write!(f, "Id({:#04x})", id),
            Checker::Predicate(_) => f.write_str("Predicate"),
            Checker::ConnPredicate(_) => f.write_str("ConnPredicate"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listener_identity() {
        let a = Listener::new("a", |_, _| async { Ok(()) });
        let b = Listener::new("a", |_, _| async { Ok(()) });
        assert!(a.ptr_eq(&a.clone()));
        assert!(!a.ptr_eq(&b));
        assert_eq!(a.name(), "a");
    }
}
