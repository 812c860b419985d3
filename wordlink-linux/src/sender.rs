//! Sender task: drains the outbound queue in order and owns the resend ledger.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{mpsc, watch, Notify};
use tokio::time::Instant;
use wordlink_core::integrity::payload_digest;
use wordlink_core::protocol::NO_GAME;
use wordlink_core::{
    InviteInfo, MessageSend, OutboundAction, PeerAddress, Reply, Request, ResendLedger,
    RetryOutcome, TransportEvent,
};

use crate::connection::Link;
use crate::context::TransportContext;

/// How many deleted game ids are remembered. The oldest is forgotten first.
const MAX_DEAD_GAMES: usize = 256;

/// Games deleted locally. Queued sends for them are discarded instead of delivered.
#[derive(Default)]
pub struct DeadGames {
    inner: Mutex<DeadInner>,
}

#[derive(Default)]
struct DeadInner {
    all: HashSet<i32>,
    order: VecDeque<i32>,
    unpurged: Vec<i32>,
}

impl DeadGames {
    pub fn insert(&self, game_id: i32) {
        let mut g = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if !g.all.insert(game_id) {
            return;
        }
        g.order.push_back(game_id);
        g.unpurged.push(game_id);
        while g.order.len() > MAX_DEAD_GAMES {
            if let Some(old) = g.order.pop_front() {
                g.all.remove(&old);
            }
        }
    }

    pub fn contains(&self, game_id: i32) -> bool {
        let g = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        g.all.contains(&game_id)
    }

    /// Ids that died since the last call.
    fn take_unpurged(&self) -> Vec<i32> {
        let mut g = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut g.unpurged)
    }
}

pub struct SenderWorker<L: Link> {
    ctx: Arc<TransportContext>,
    link: L,
    queue: mpsc::UnboundedReceiver<OutboundAction>,
    ledger: ResendLedger,
    dead_games: Arc<DeadGames>,
    resend_now: Arc<Notify>,
    shutdown: watch::Receiver<bool>,
    resend_due: Option<Instant>,
}

impl<L: Link> SenderWorker<L> {
    pub fn new(
        ctx: Arc<TransportContext>,
        link: L,
        queue: mpsc::UnboundedReceiver<OutboundAction>,
        dead_games: Arc<DeadGames>,
        resend_now: Arc<Notify>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            ctx,
            link,
            queue,
            ledger: ResendLedger::new(),
            dead_games,
            resend_now,
            shutdown,
            resend_due: None,
        }
    }

    /// Run until shutdown or until every queue handle is gone.
    pub async fn run(mut self) {
        tracing::info!("sender: running");
        loop {
            if self.stopping() {
                break;
            }
            if self.resend_due.is_some_and(|due| due <= Instant::now()) {
                self.sweep().await;
                continue;
            }
            let due = self.resend_due;
            tokio::select! {
                biased;
                _ = self.shutdown.changed() => break,
                action = self.queue.recv() => match action {
                    Some(action) => self.dispatch(action).await,
                    None => break,
                },
                _ = self.resend_now.notified() => self.sweep().await,
                _ = resend_timer(due) => self.sweep().await,
            }
        }
        tracing::info!("sender: exiting with {} messages unsent", self.ledger.len());
    }

    fn stopping(&self) -> bool {
        *self.shutdown.borrow()
    }

    async fn dispatch(&mut self, action: OutboundAction) {
        tracing::debug!("sender: {} {:?}", action.kind(), action.peer());
        self.purge_dead();
        match action {
            OutboundAction::Ping {
                peer: Some(peer),
                game_id,
            } => self.ping_one(&peer, game_id).await,
            OutboundAction::Ping { peer: None, .. } => self.ping_paired().await,
            OutboundAction::Scan => {
                self.ping_paired().await;
                self.ctx.post(TransportEvent::ScanDone {
                    addresses: self.ctx.address_book.snapshot(),
                });
            }
            OutboundAction::Invite { peer, info } => self.invite(&peer, &info).await,
            OutboundAction::Send(send) => self.send_new(send).await,
        }
    }

    /// `Some(game_deleted)` when the peer answered with PONG.
    async fn ping(&self, peer: &PeerAddress, game_id: i32) -> Option<bool> {
        let request = Request::Ping { game_id };
        match self.link.exchange(peer, &request, self.ctx.timeouts.ping).await {
            Ok(Reply::Pong { game_deleted }) => Some(game_deleted),
            Ok(Reply::BadProto) => {
                self.ctx.post(TransportEvent::BadProto { peer: peer.clone() });
                None
            }
            Ok(other) => {
                tracing::warn!("ping {peer}: unexpected {}", other.command());
                None
            }
            Err(e) => {
                tracing::debug!("ping {peer}: {e}");
                None
            }
        }
    }

    async fn ping_one(&self, peer: &PeerAddress, game_id: i32) {
        match self.ping(peer, game_id).await {
            Some(true) => self.ctx.post(TransportEvent::NoSuchGame {
                peer: peer.clone(),
                game_id,
            }),
            Some(false) => {
                self.ctx.address_book.add(peer);
                self.ctx
                    .post(TransportEvent::HostPonged { peer: peer.clone() });
            }
            None => {}
        }
    }

    /// Ping each paired device the address book does not have yet.
    async fn ping_paired(&self) {
        for device in self.ctx.adapter.paired_devices() {
            if self.stopping() {
                return;
            }
            if self.ctx.address_book.contains(&device.address) {
                continue;
            }
            if self.ping(&device.address, NO_GAME).await.is_some() {
                tracing::info!("found {} at {}", device.name, device.address);
                self.ctx.address_book.add(&device.address);
                self.ctx.post(TransportEvent::HostPonged {
                    peer: device.address,
                });
            }
        }
    }

    async fn invite(&self, peer: &PeerAddress, info: &InviteInfo) {
        let game_id = info.game_id;
        if !info.is_valid() {
            tracing::warn!("invite for game {game_id:X}: inconsistent player counts; not sent");
            self.ctx
                .post(TransportEvent::NewGameFailure { game_id, reply: None });
            return;
        }
        let blob = match info.to_json() {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!("invite for game {game_id:X}: {e}");
                self.ctx
                    .post(TransportEvent::NewGameFailure { game_id, reply: None });
                return;
            }
        };
        let request = Request::Invite { blob };
        match self.link.exchange(peer, &request, self.ctx.timeouts.io).await {
            Ok(Reply::InviteAccept) => self.ctx.post(TransportEvent::NewGameSuccess { game_id }),
            Ok(reply) => {
                if reply == Reply::BadProto {
                    self.ctx.post(TransportEvent::BadProto { peer: peer.clone() });
                }
                self.ctx.post(TransportEvent::NewGameFailure {
                    game_id,
                    reply: Some(reply.command()),
                });
            }
            Err(e) => {
                tracing::info!("invite to {peer}: {e}");
                self.ctx
                    .post(TransportEvent::AppNotFound { peer: peer.clone() });
            }
        }
    }

    async fn send_new(&mut self, send: MessageSend) {
        if self.dead_games.contains(send.game_id) {
            self.ctx.post(TransportEvent::MessageDropped {
                game_id: send.game_id,
            });
            return;
        }
        // Older messages for this peer go first.
        if !self.resend_pass(&send.peer).await {
            tracing::debug!("{}: older messages pending, queueing behind them", send.peer);
            self.ledger.defer(send);
            self.arm_resend();
            return;
        }
        if !self.attempt(&send).await {
            let (peer, game_id) = (send.peer.clone(), send.game_id);
            let outcome = self.ledger.fail_new(send);
            self.report(&peer, game_id, outcome);
        }
    }

    /// Try `peer`'s queued sends oldest first, stopping at the first failure.
    /// Returns true when nothing is left queued for the peer.
    async fn resend_pass(&mut self, peer: &PeerAddress) -> bool {
        while let Some(front) = self.ledger.front(peer).map(|p| p.send.clone()) {
            if self.attempt(&front).await {
                self.ledger.complete_front(peer);
                continue;
            }
            if let Some(outcome) = self.ledger.fail_front(peer) {
                self.report(peer, front.game_id, outcome);
            }
            return !self.ledger.has_pending_for(peer);
        }
        true
    }

    /// One MESSAGE_SEND exchange. True when the peer took it or no longer has the game.
    async fn attempt(&self, send: &MessageSend) -> bool {
        let peer = &send.peer;
        let game_id = send.game_id;
        tracing::debug!(
            "sending {} bytes ({}) for game {game_id:X} to {peer}",
            send.payload.len(),
            payload_digest(&send.payload)
        );
        let request = Request::MessageSend {
            game_id,
            payload: send.payload.clone(),
        };
        let event = match self.link.exchange(peer, &request, self.ctx.timeouts.io).await {
            Ok(Reply::MessageAccept) => {
                self.ctx.post(TransportEvent::MessageAccepted {
                    peer: peer.clone(),
                    game_id,
                });
                return true;
            }
            Ok(Reply::MessageGameGone) => {
                self.ctx.post(TransportEvent::MessageNoGame {
                    peer: peer.clone(),
                    game_id,
                });
                return true;
            }
            Ok(Reply::BadProto) => TransportEvent::BadProto { peer: peer.clone() },
            Ok(_) => TransportEvent::MessageRefused {
                peer: peer.clone(),
                game_id,
            },
            Err(e) => {
                tracing::debug!("send to {peer}: {e}");
                return false;
            }
        };
        self.ctx.post(event);
        false
    }

    fn report(&mut self, peer: &PeerAddress, game_id: i32, outcome: RetryOutcome) {
        match outcome {
            RetryOutcome::Retrying { fail_count } => {
                self.ctx.post(TransportEvent::MessageResend {
                    peer: peer.clone(),
                    retry_in: self.ctx.timeouts.resend_interval,
                    fail_count,
                });
                self.arm_resend();
            }
            RetryOutcome::Exhausted(pending) => {
                tracing::warn!(
                    "giving up on game {game_id:X} message to {peer} after {} tries",
                    pending.fail_count
                );
                self.ctx.post(TransportEvent::MessageFailout {
                    peer: peer.clone(),
                    game_id,
                });
            }
        }
    }

    fn arm_resend(&mut self) {
        if self.resend_due.is_none() {
            self.resend_due = Some(Instant::now() + self.ctx.timeouts.resend_interval);
        }
    }

    fn purge_dead(&mut self) {
        for game_id in self.dead_games.take_unpurged() {
            for pending in self.ledger.drop_game(game_id) {
                tracing::info!(
                    "dropping queued message for deleted game {game_id:X} to {}",
                    pending.send.peer
                );
                self.ctx.post(TransportEvent::MessageDropped { game_id });
            }
        }
    }

    /// Retry everything queued, peer by peer.
    async fn sweep(&mut self) {
        self.resend_due = None;
        self.purge_dead();
        for peer in self.ledger.peers() {
            if self.stopping() {
                return;
            }
            self.resend_pass(&peer).await;
        }
        if self.ledger.has_pending() {
            self.arm_resend();
        }
    }
}

async fn resend_timer(due: Option<Instant>) {
    match due {
        Some(due) => tokio::time::sleep_until(due).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnError;
    use crate::testutil::{self, Recorder};
    use std::collections::VecDeque;
    use std::time::Duration;
    use wordlink_core::Command;

    type Calls = Arc<Mutex<Vec<(PeerAddress, Request)>>>;

    /// Replies from a script, then `fallback`. `None` is a transport failure.
    struct ScriptedLink {
        calls: Calls,
        script: Arc<Mutex<VecDeque<Option<Reply>>>>,
        fallback: Option<Reply>,
    }

    impl Link for ScriptedLink {
        async fn exchange(
            &self,
            peer: &PeerAddress,
            request: &Request,
            _watchdog: Duration,
        ) -> Result<Reply, ConnError> {
            self.calls
                .lock()
                .unwrap()
                .push((peer.clone(), request.clone()));
            let next = self.script.lock().unwrap().pop_front();
            next.unwrap_or(self.fallback).ok_or(ConnError::Timeout)
        }
    }

    struct Rig {
        worker: SenderWorker<ScriptedLink>,
        calls: Calls,
        script: Arc<Mutex<VecDeque<Option<Reply>>>>,
        events: Arc<Recorder>,
        dead: Arc<DeadGames>,
        ctx: Arc<TransportContext>,
        _queue: mpsc::UnboundedSender<OutboundAction>,
        _shutdown: watch::Sender<bool>,
    }

    fn rig(paired: &[(&str, &str)], fallback: Option<Reply>) -> Rig {
        let (ctx, events) = testutil::context(paired);
        let calls: Calls = Arc::default();
        let script = Arc::new(Mutex::new(VecDeque::new()));
        let link = ScriptedLink {
            calls: calls.clone(),
            script: script.clone(),
            fallback,
        };
        let (tx, rx) = mpsc::unbounded_channel();
        let (stop, stop_rx) = watch::channel(false);
        let dead = Arc::new(DeadGames::default());
        let worker = SenderWorker::new(
            ctx.clone(),
            link,
            rx,
            dead.clone(),
            Arc::new(Notify::new()),
            stop_rx,
        );
        Rig {
            worker,
            calls,
            script,
            events,
            dead,
            ctx,
            _queue: tx,
            _shutdown: stop,
        }
    }

    fn msg(peer: &str, game_id: i32, tag: u8) -> OutboundAction {
        OutboundAction::Send(MessageSend {
            peer: PeerAddress::new(peer),
            game_id,
            payload: vec![tag],
        })
    }

    fn sent_tags(calls: &Calls) -> Vec<u8> {
        calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(_, r)| match r {
                Request::MessageSend { payload, .. } => payload.first().copied(),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn older_message_goes_before_newer() {
        let mut r = rig(&[], Some(Reply::MessageAccept));
        r.script.lock().unwrap().extend([None, None]);
        r.worker.dispatch(msg("p:1", 7, b'A')).await;
        r.worker.dispatch(msg("p:1", 7, b'B')).await;
        r.worker.dispatch(msg("p:1", 7, b'C')).await;
        assert_eq!(sent_tags(&r.calls), b"AAABC".to_vec());
        assert!(r.worker.ledger.is_empty());
        assert_eq!(r.events.count(|e| matches!(e, TransportEvent::MessageAccepted { .. })), 3);
    }

    #[tokio::test]
    async fn third_failure_gives_up() {
        let mut r = rig(&[], None);
        r.worker.dispatch(msg("p:1", 7, b'A')).await;
        r.worker.sweep().await;
        assert_eq!(r.worker.ledger.len(), 1);
        r.worker.sweep().await;
        assert!(r.worker.ledger.is_empty());
        assert_eq!(sent_tags(&r.calls), b"AAA".to_vec());
        let resends: Vec<u32> = r
            .events
            .all()
            .into_iter()
            .filter_map(|e| match e {
                TransportEvent::MessageResend { fail_count, .. } => Some(fail_count),
                _ => None,
            })
            .collect();
        assert_eq!(resends, vec![1, 2]);
        assert_eq!(
            r.events.all().last(),
            Some(&TransportEvent::MessageFailout {
                peer: PeerAddress::new("p:1"),
                game_id: 7
            })
        );
    }

    #[tokio::test]
    async fn failure_is_armed_for_a_later_sweep() {
        let mut r = rig(&[], None);
        r.worker.dispatch(msg("p:1", 7, b'A')).await;
        assert!(r.worker.resend_due.is_some());
        r.script.lock().unwrap().push_back(Some(Reply::MessageAccept));
        r.worker.sweep().await;
        assert!(r.worker.ledger.is_empty());
        assert!(r.worker.resend_due.is_none());
    }

    #[tokio::test]
    async fn one_peer_failing_does_not_hold_another() {
        let mut r = rig(&[], Some(Reply::MessageAccept));
        r.script.lock().unwrap().push_back(None);
        r.worker.dispatch(msg("p:1", 7, b'A')).await;
        r.worker.dispatch(msg("q:1", 8, b'B')).await;
        assert_eq!(sent_tags(&r.calls), b"AB".to_vec());
        assert_eq!(r.worker.ledger.peers(), vec![PeerAddress::new("p:1")]);
    }

    #[tokio::test]
    async fn game_gone_reply_is_not_retried() {
        let mut r = rig(&[], Some(Reply::MessageGameGone));
        r.worker.dispatch(msg("p:1", 7, b'A')).await;
        assert!(r.worker.ledger.is_empty());
        assert_eq!(
            r.events.all(),
            vec![TransportEvent::MessageNoGame {
                peer: PeerAddress::new("p:1"),
                game_id: 7
            }]
        );
    }

    #[tokio::test]
    async fn decline_is_retried() {
        let mut r = rig(&[], Some(Reply::MessageDecline));
        r.worker.dispatch(msg("p:1", 7, b'A')).await;
        assert_eq!(r.worker.ledger.len(), 1);
        assert!(r
            .events
            .all()
            .contains(&TransportEvent::MessageRefused {
                peer: PeerAddress::new("p:1"),
                game_id: 7
            }));
    }

    #[tokio::test]
    async fn dead_game_sends_are_dropped() {
        let mut r = rig(&[], None);
        r.worker.dispatch(msg("p:1", 7, b'A')).await;
        r.worker.dispatch(msg("p:1", 8, b'B')).await;
        assert_eq!(r.worker.ledger.len(), 2);
        r.dead.insert(7);
        r.worker.dispatch(msg("p:1", 7, b'C')).await;
        assert_eq!(r.worker.ledger.len(), 1);
        assert_eq!(
            r.events.count(|e| *e == TransportEvent::MessageDropped { game_id: 7 }),
            2
        );
        assert!(!sent_tags(&r.calls).contains(&b'C'));
    }

    #[test]
    fn dead_games_forget_the_oldest() {
        let dead = DeadGames::default();
        for id in 0..MAX_DEAD_GAMES as i32 + 2 {
            dead.insert(id);
        }
        assert!(!dead.contains(0));
        assert!(!dead.contains(1));
        assert!(dead.contains(2));
        assert!(dead.contains(MAX_DEAD_GAMES as i32 + 1));
        assert_eq!(dead.take_unpurged().len(), MAX_DEAD_GAMES + 2);
    }

    #[tokio::test]
    async fn scan_pings_only_unknown_devices() {
        let mut r = rig(
            &[("den", "10.0.0.2:45690"), ("attic", "10.0.0.3:45690")],
            Some(Reply::Pong {
                game_deleted: false,
            }),
        );
        r.ctx.address_book.add(&PeerAddress::new("10.0.0.2:45690"));
        r.worker.dispatch(OutboundAction::Scan).await;
        let pinged: Vec<PeerAddress> =
            r.calls.lock().unwrap().iter().map(|(p, _)| p.clone()).collect();
        assert_eq!(pinged, vec![PeerAddress::new("10.0.0.3:45690")]);
        assert_eq!(
            r.events.all(),
            vec![
                TransportEvent::HostPonged {
                    peer: PeerAddress::new("10.0.0.3:45690")
                },
                TransportEvent::ScanDone {
                    addresses: vec![
                        PeerAddress::new("10.0.0.2:45690"),
                        PeerAddress::new("10.0.0.3:45690"),
                    ]
                },
            ]
        );
    }

    #[tokio::test]
    async fn ping_for_deleted_game() {
        let mut r = rig(&[], Some(Reply::Pong { game_deleted: true }));
        r.worker
            .dispatch(OutboundAction::Ping {
                peer: Some(PeerAddress::new("p:1")),
                game_id: 0x42,
            })
            .await;
        assert_eq!(
            r.events.all(),
            vec![TransportEvent::NoSuchGame {
                peer: PeerAddress::new("p:1"),
                game_id: 0x42
            }]
        );
    }

    #[tokio::test]
    async fn invite_outcomes() {
        let mut r = rig(&[], Some(Reply::InviteDupId));
        let info = InviteInfo::new(0x42, 1, "CollegeEng_2to8", 2, 1);
        let peer = PeerAddress::new("p:1");
        r.worker
            .dispatch(OutboundAction::Invite {
                peer: peer.clone(),
                info: info.clone(),
            })
            .await;
        r.script.lock().unwrap().push_back(None);
        r.worker
            .dispatch(OutboundAction::Invite {
                peer: peer.clone(),
                info,
            })
            .await;
        assert_eq!(
            r.events.all(),
            vec![
                TransportEvent::NewGameFailure {
                    game_id: 0x42,
                    reply: Some(Command::InviteDupId)
                },
                TransportEvent::AppNotFound { peer },
            ]
        );
    }

    #[tokio::test]
    async fn invalid_invite_never_connects() {
        let mut r = rig(&[], Some(Reply::InviteAccept));
        let info = InviteInfo::new(0x42, 1, "CollegeEng_2to8", 2, 3);
        r.worker
            .dispatch(OutboundAction::Invite {
                peer: PeerAddress::new("p:1"),
                info,
            })
            .await;
        assert!(r.calls.lock().unwrap().is_empty());
        assert_eq!(
            r.events.all(),
            vec![TransportEvent::NewGameFailure {
                game_id: 0x42,
                reply: None
            }]
        );
    }

    #[tokio::test]
    async fn overdue_sweep_runs_before_next_action() {
        let mut r = rig(&[], Some(Reply::MessageAccept));
        r.script.lock().unwrap().push_back(None);
        r.worker.dispatch(msg("p:1", 7, b'A')).await;
        assert_eq!(r.worker.ledger.len(), 1);
        // The deadline has already passed and a new action is waiting.
        r.worker.resend_due = Some(Instant::now());
        r._queue.send(msg("q:1", 8, b'B')).unwrap();
        let calls = r.calls.clone();
        let task = tokio::spawn(r.worker.run());
        tokio::time::timeout(Duration::from_secs(2), async {
            while calls.lock().unwrap().len() < 3 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        r._shutdown.send(true).unwrap();
        task.await.unwrap();
        assert_eq!(sent_tags(&calls), b"AAB".to_vec());
    }

    #[tokio::test]
    async fn run_exits_on_shutdown() {
        let r = rig(&[], None);
        let stop = r._shutdown;
        let task = tokio::spawn(r.worker.run());
        stop.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
    }
}
