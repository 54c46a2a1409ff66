//! Routes decoded packets to registered listeners.
//!
//! Packets of the handshaking, status and login phases are dispatched
//! sequentially: every matching listener finishes before the connection reads
//! its next packet, so key exchange and compression changes take effect in
//! order. Play packets are dispatched concurrently; each listener becomes a
//! task owned by the connection, which winds them down when it closes.

use crate::connection::Connection;
use crate::error::ServerError;
use crate::listener::{Checker, Listener};
use craftwire_protocol::{Direction, Packet, Phase};
use futures::future::join_all;
use futures::FutureExt;
use parking_lot::RwLock;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// How a packet's listeners are run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    Sequential,
    Concurrent,
}

impl DispatchMode {
    pub fn for_phase(phase: Phase) -> Self {
        match phase {
            Phase::Play => DispatchMode::Concurrent,
            Phase::Handshaking | Phase::Status | Phase::Login => DispatchMode::Sequential,
        }
    }
}

/// Dispatch counters.
#[derive(Debug, Default)]
pub struct DispatchStats {
    pub packets_dispatched: AtomicU64,
    pub listener_runs: AtomicU64,
    pub listener_errors: AtomicU64,
}

struct Registration {
    listener: Listener,
    checkers: Vec<Checker>,
    direction: Direction,
}

impl Registration {
    fn accepts(&self, conn: &Connection, packet: &Packet, direction: Direction) -> bool {
        self.direction == direction && self.checkers.iter().any(|c| c.matches(conn, packet))
    }
}

/// Listener registry shared by every connection of an endpoint.
#[derive(Default)]
pub struct Dispatcher {
    registrations: RwLock<Vec<Registration>>,
    stats: Arc<DispatchStats>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` for packets travelling in `direction` that any of
    /// `checkers` accepts.
    pub fn register(
        &self,
        listener: &Listener,
        checkers: impl IntoIterator<Item = Checker>,
        direction: Direction,
    ) -> Result<(), ServerError> {
        let checkers: Vec<Checker> = checkers.into_iter().collect();
        if checkers.is_empty() {
            return Err(ServerError::NoCheckers(listener.name().to_string()));
        }

        let mut registrations = self.registrations.write();
        if registrations.iter().any(|r| r.listener.ptr_eq(listener)) {
            return Err(ServerError::DuplicateListener(listener.name().to_string()));
        }
        tracing::debug!(
            "Registered listener '{}' for {:?} packets ({:?})",
            listener.name(),
            direction,
            checkers
        );
        registrations.push(Registration {
            listener: listener.clone(),
            checkers,
            direction,
        });
        Ok(())
    }

    /// Removes `listener`. Returns whether it was registered.
    pub fn unregister(&self, listener: &Listener) -> bool {
        let mut registrations = self.registrations.write();
        let before = registrations.len();
        registrations.retain(|r| !r.listener.ptr_eq(listener));
        registrations.len() != before
    }

    /// Returns, in registration order, the listeners that accept `packet`.
    pub fn listeners_for(
        &self,
        conn: &Connection,
        packet: &Packet,
        direction: Direction,
    ) -> Vec<Listener> {
        self.registrations
            .read()
            .iter()
            .filter(|r| r.accepts(conn, packet, direction))
            .map(|r| r.listener.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.registrations.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.read().is_empty()
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    /// Runs the listeners for one packet.
    ///
    /// Returns once every listener has finished (sequential mode) or has been
    /// handed to the connection's task set (concurrent mode).
    pub async fn dispatch(
        &self,
        conn: &Arc<Connection>,
        packet: Arc<Packet>,
        direction: Direction,
    ) {
        self.stats.packets_dispatched.fetch_add(1, Ordering::Relaxed);
        let listeners = self.listeners_for(conn, &packet, direction);
        if listeners.is_empty() {
            return;
        }
        self.stats
            .listener_runs
            .fetch_add(listeners.len() as u64, Ordering::Relaxed);

        match DispatchMode::for_phase(packet.phase()) {
            DispatchMode::Sequential => {
                let runs = listeners.into_iter().map(|listener| {
                    run_listener(listener, conn.clone(), packet.clone(), self.stats.clone())
                });
                join_all(runs).await;
            }
            DispatchMode::Concurrent => {
                for listener in listeners {
                    conn.spawn(run_listener(
                        listener,
                        conn.clone(),
                        packet.clone(),
                        self.stats.clone(),
                    ));
                }
            }
        }
    }
}

async fn run_listener(
    listener: Listener,
    conn: Arc<Connection>,
    packet: Arc<Packet>,
    stats: Arc<DispatchStats>,
) {
    let outcome = AssertUnwindSafe(listener.call(conn.clone(), packet.clone()))
        .catch_unwind()
        .await;
    let failure = match outcome {
        Ok(Ok(())) => return,
        Ok(Err(e)) => e.to_string(),
        Err(_) => "panicked".to_string(),
    };
    stats.listener_errors.fetch_add(1, Ordering::Relaxed);
    tracing::warn!(
        "[{}] Listener '{}' failed on {}: {}",
        conn.label(),
        listener.name(),
        packet.name(),
        failure
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{Connection, ConnectionConfig, Side};
    use craftwire_protocol::packets::{handshaking, play, status};
    use craftwire_protocol::{PacketRegistry, Version};
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    fn connection(grace: Duration) -> (Arc<Connection>, tokio::io::DuplexStream) {
        let (ours, theirs) = tokio::io::duplex(4096);
        let config = ConnectionConfig::default()
            .with_version(Version::V1_12_2)
            .with_grace_period(grace);
        let conn = Connection::builder(Side::Server)
            .registry(Arc::new(PacketRegistry::standard()))
            .dispatcher(Arc::new(Dispatcher::new()))
            .config(config)
            .open(ours)
            .unwrap();
        (conn, theirs)
    }

    fn ping(payload: i64) -> Packet {
        Packet::new(&status::serverbound::PING, &Version::V1_12_2)
            .unwrap()
            .with("payload", payload)
            .unwrap()
    }

    fn keep_alive() -> Packet {
        Packet::new(&play::serverbound::KEEP_ALIVE, &Version::V1_12_2).unwrap()
    }

    fn noop(name: &str) -> Listener {
        Listener::new(name.to_string(), |_, _| async { Ok(()) })
    }

    #[tokio::test]
    async fn test_checkers_are_or_combined() {
        let (conn, _peer) = connection(Duration::from_millis(10));
        let dispatcher = Dispatcher::new();
        let listener = noop("either");
        dispatcher
            .register(
                &listener,
                [
                    Checker::packet(&status::serverbound::PING),
                    Checker::id(0x0b),
                ],
                Direction::Serverbound,
            )
            .unwrap();

        let request = Packet::new(&status::serverbound::STATUS_REQUEST, &Version::V1_12_2).unwrap();
        assert_eq!(dispatcher.listeners_for(&conn, &ping(1), Direction::Serverbound).len(), 1);
        assert_eq!(
            dispatcher
                .listeners_for(&conn, &keep_alive(), Direction::Serverbound)
                .len(),
            1
        );
        assert!(dispatcher.listeners_for(&conn, &request, Direction::Serverbound).is_empty());
        assert!(dispatcher.listeners_for(&conn, &ping(1), Direction::Clientbound).is_empty());
    }

    #[tokio::test]
    async fn test_predicates_and_order() {
        let (conn, _peer) = connection(Duration::from_millis(10));
        let dispatcher = Dispatcher::new();
        let second = noop("second");
        let first = noop("first");
        dispatcher
            .register(&first, [Checker::any()], Direction::Serverbound)
            .unwrap();
        dispatcher
            .register(
                &second,
                [Checker::conn_predicate(|conn, packet| {
                    conn.version() == Version::V1_12_2 && packet.get("payload").is_some()
                })],
                Direction::Serverbound,
            )
            .unwrap();

        let names: Vec<String> = dispatcher
            .listeners_for(&conn, &ping(5), Direction::Serverbound)
            .iter()
            .map(|l| l.name().to_string())
            .collect();
        assert_eq!(names, ["first", "second"]);

        let handshake =
            Packet::new(&handshaking::serverbound::HANDSHAKE, &Version::V1_12_2).unwrap();
        assert_eq!(
            dispatcher
                .listeners_for(&conn, &handshake, Direction::Serverbound)
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_register_rules() {
        let dispatcher = Dispatcher::new();
        let listener = noop("log");
        assert!(matches!(
            dispatcher.register(&listener, Vec::new(), Direction::Serverbound),
            Err(ServerError::NoCheckers(_))
        ));
        dispatcher
            .register(&listener, [Checker::any()], Direction::Serverbound)
            .unwrap();
        assert!(matches!(
            dispatcher.register(&listener.clone(), [Checker::any()], Direction::Clientbound),
            Err(ServerError::DuplicateListener(_))
        ));
    }

    #[tokio::test]
    async fn test_unregister_removes_only_that_listener() {
        let (conn, _peer) = connection(Duration::from_millis(10));
        let dispatcher = Dispatcher::new();
        let a = noop("a");
        let b = noop("b");
        for l in [&a, &b] {
            dispatcher
                .register(l, [Checker::any()], Direction::Serverbound)
                .unwrap();
        }

        assert!(dispatcher.unregister(&a));
        assert!(!dispatcher.unregister(&a));
        let left = dispatcher.listeners_for(&conn, &ping(1), Direction::Serverbound);
        assert_eq!(left.len(), 1);
        assert!(left[0].ptr_eq(&b));

        dispatcher
            .register(&a, [Checker::any()], Direction::Serverbound)
            .unwrap();
        assert_eq!(dispatcher.len(), 2);
    }

    #[tokio::test]
    async fn test_sequential_dispatch_waits_for_listeners() {
        let (conn, _peer) = connection(Duration::from_millis(10));
        let dispatcher = Dispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let slow_log = log.clone();
        let slow = Listener::new("slow", move |_, packet| {
            let log = slow_log.clone();
            async move {
                let payload = packet.get("payload").and_then(|v| v.as_i64()).unwrap_or(0);
                if payload == 1 {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
                log.lock().push(payload);
                Ok(())
            }
        });
        dispatcher
            .register(
                &slow,
                [Checker::packet(&status::serverbound::PING)],
                Direction::Serverbound,
            )
            .unwrap();

        dispatcher
            .dispatch(&conn, Arc::new(ping(1)), Direction::Serverbound)
            .await;
        assert_eq!(*log.lock(), [1]);
        dispatcher
            .dispatch(&conn, Arc::new(ping(2)), Direction::Serverbound)
            .await;
        assert_eq!(*log.lock(), [1, 2]);
    }

    #[tokio::test]
    async fn test_failing_listeners_are_isolated() {
        let (conn, _peer) = connection(Duration::from_millis(10));
        let dispatcher = Dispatcher::new();
        let ran = Arc::new(AtomicBool::new(false));

        let failing = Listener::new("failing", |_, _| async { Err("boom".into()) });
        let panicking = Listener::new("panicking", |_, packet: Arc<Packet>| async move {
            if packet.get("payload").is_some() {
                panic!("listener panic");
            }
            Ok(())
        });
        let flag = ran.clone();
        let healthy = Listener::new("healthy", move |_, _| {
            let flag = flag.clone();
            async move {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            }
        });
        for l in [&failing, &panicking, &healthy] {
            dispatcher
                .register(l, [Checker::any()], Direction::Serverbound)
                .unwrap();
        }

        dispatcher
            .dispatch(&conn, Arc::new(ping(1)), Direction::Serverbound)
            .await;
        assert!(ran.load(Ordering::SeqCst));
        assert_eq!(dispatcher.stats().listener_errors.load(Ordering::Relaxed), 2);
        assert_eq!(dispatcher.stats().listener_runs.load(Ordering::Relaxed), 3);
    }

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_concurrent_listener_cancelled_after_grace() {
        let (conn, _peer) = connection(Duration::from_millis(50));
        let dispatcher = Dispatcher::new();
        let dropped = Arc::new(AtomicBool::new(false));
        let started = Arc::new(tokio::sync::Notify::new());

        let flag = dropped.clone();
        let notify = started.clone();
        let stuck = Listener::new("stuck", move |_, _| {
            let guard = DropFlag(flag.clone());
            let notify = notify.clone();
            async move {
                let _guard = guard;
                notify.notify_one();
                futures::future::pending::<()>().await;
                Ok(())
            }
        });
        dispatcher
            .register(
                &stuck,
                [Checker::packet(&play::serverbound::KEEP_ALIVE)],
                Direction::Serverbound,
            )
            .unwrap();

        // Returns immediately: the listener runs as a connection task.
        dispatcher
            .dispatch(&conn, Arc::new(keep_alive()), Direction::Serverbound)
            .await;
        started.notified().await;
        assert!(!dropped.load(Ordering::SeqCst));

        conn.close().await;
        tokio::time::timeout(Duration::from_secs(2), conn.wind_down())
            .await
            .unwrap();
        assert!(dropped.load(Ordering::SeqCst));
    }
}
