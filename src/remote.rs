//! Registration hooks for an external transport.
//!
//! The core does not serialize and defines no wire format; it only keeps
//! the tables a transport needs so that remote proxies can be treated as
//! ordinary channels:
//!
//! - [`add_peer`] — associate a connected socket with the peer's process
//!   information and a local proxy actor.
//! - [`publish`] / [`unpublish`] — expose a local actor on a listening
//!   socket.
//! - [`close_socket`] — tear a connection down, terminating its proxy
//!   with [`ExitReason::REMOTE_LINK_UNREACHABLE`] so links to the remote
//!   actor observe the broken connection.

use std::collections::HashMap;
use std::sync::{LazyLock, Mutex};

use log::debug;

use crate::actor::{self, ActorId, ActorRef, ExitReason};

/// OS-level socket descriptor, opaque to the core.
pub type SocketFd = i32;

/// Identity of a peer process.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct ProcessInfo {
    /// Peer's OS process id.
    pub process_id: u32,
    /// Peer's node fingerprint.
    pub node_hash: [u8; 20],
}

struct Peer {
    info: ProcessInfo,
    proxy: ActorRef,
}

static PEERS: LazyLock<Mutex<HashMap<SocketFd, Peer>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

static PUBLISHED: LazyLock<Mutex<HashMap<ActorId, (SocketFd, ActorRef)>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Register a connected peer: its socket, identity, and the local proxy
/// actor standing in for it. The proxy's control block records the peer's
/// process information.
pub fn add_peer(socket: SocketFd, info: ProcessInfo, proxy: &ActorRef) {
    let _ = proxy.cell.process.set(info.clone());
    debug!(
        "peer process {} registered on socket {socket} via actor {}",
        info.process_id,
        proxy.id()
    );
    PEERS
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .insert(socket, Peer {
            info,
            proxy: proxy.clone(),
        });
}

/// The proxy actor registered for `socket`.
#[must_use]
pub fn peer_proxy(socket: SocketFd) -> Option<ActorRef> {
    PEERS
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .get(&socket)
        .map(|peer| peer.proxy.clone())
}

/// The process information registered for `socket`.
#[must_use]
pub fn peer_info(socket: SocketFd) -> Option<ProcessInfo> {
    PEERS
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .get(&socket)
        .map(|peer| peer.info.clone())
}

/// Publish a local actor on a listening socket.
pub fn publish(socket: SocketFd, actor: &ActorRef) {
    debug!("actor {} published on socket {socket}", actor.id());
    PUBLISHED
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .insert(actor.id(), (socket, actor.clone()));
}

/// Remove a published actor by id. Safe to call for unknown ids.
pub fn unpublish(id: ActorId) {
    PUBLISHED.lock().unwrap_or_else(|e| e.into_inner()).remove(&id);
}

/// Resolve a published actor by id.
#[must_use]
pub fn published(id: ActorId) -> Option<ActorRef> {
    PUBLISHED
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .get(&id)
        .map(|(_, actor)| actor.clone())
}

/// Tear down everything tied to `socket`: the peer's proxy terminates
/// with [`ExitReason::REMOTE_LINK_UNREACHABLE`] (propagating through any
/// links), and actors published on the socket are unpublished.
pub fn close_socket(socket: SocketFd) {
    let peer = PEERS
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .remove(&socket);
    if let Some(peer) = peer {
        debug!(
            "socket {socket} closed, dropping proxy {} for process {}",
            peer.proxy.id(),
            peer.info.process_id
        );
        actor::terminate(&peer.proxy, ExitReason::REMOTE_LINK_UNREACHABLE);
    }
    PUBLISHED
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .retain(|_, (fd, _)| *fd != socket);
}

// ── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::ActorCell;
    use crate::scheduler::Hint;

    fn fresh_ref() -> ActorRef {
        ActorRef {
            cell: ActorCell::new(Hint::DetachedHidden, None),
        }
    }

    fn info(pid: u32) -> ProcessInfo {
        ProcessInfo {
            process_id: pid,
            node_hash: [0xAB; 20],
        }
    }

    #[test]
    fn peer_tables_round_trip() {
        let proxy = fresh_ref();
        add_peer(1001, info(7), &proxy);

        assert_eq!(peer_proxy(1001).map(|p| p.id()), Some(proxy.id()));
        assert_eq!(peer_info(1001).map(|i| i.process_id), Some(7));
        assert_eq!(proxy.cell.process.get().map(|i| i.process_id), Some(7));
        assert!(peer_proxy(1002).is_none());

        close_socket(1001);
        assert!(peer_proxy(1001).is_none());
    }

    #[test]
    fn close_socket_terminates_the_proxy_with_remote_reason() {
        let proxy = fresh_ref();
        add_peer(2001, info(8), &proxy);
        close_socket(2001);

        assert!(proxy.is_terminated());
        assert_eq!(proxy.exit_reason(), ExitReason::REMOTE_LINK_UNREACHABLE);
    }

    #[test]
    fn publish_and_unpublish() {
        let actor = fresh_ref();
        publish(3001, &actor);
        assert_eq!(published(actor.id()).map(|a| a.id()), Some(actor.id()));

        unpublish(actor.id());
        assert!(published(actor.id()).is_none());
    }

    #[test]
    fn close_socket_unpublishes_its_actors() {
        let a = fresh_ref();
        let b = fresh_ref();
        publish(4001, &a);
        publish(4002, &b);

        close_socket(4001);
        assert!(published(a.id()).is_none());
        assert_eq!(published(b.id()).map(|x| x.id()), Some(b.id()));
        unpublish(b.id());
    }
}
