use crate::api::ApiError;
use crate::config::EnvConfig;
use crate::models::Bookmark;
use crate::store::{Change, StoreHandle};
use leptos_dom::helpers::{set_timeout_with_handle, TimeoutHandle};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};
use wasm_bindgen::closure::Closure;
use wasm_bindgen::JsCast;

pub(crate) const CHANNEL_TOPIC: &str = "realtime:bookmarks-changes";
const HEARTBEAT_MS: i32 = 25_000;
const PHOENIX_TOPIC: &str = "phoenix";
/// Reconnect delays; the last one repeats.
const RECONNECT_STEPS_MS: [u64; 4] = [1_000, 2_000, 5_000, 10_000];

/// Phoenix channel frame (`vsn=1.0.0` JSON form).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub(crate) struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub msg_ref: Option<String>,
}

impl PhoenixMessage {
    fn new(topic: &str, event: &str, payload: Value, msg_ref: u64) -> Self {
        Self {
            topic: topic.to_string(),
            event: event.to_string(),
            payload,
            msg_ref: Some(msg_ref.to_string()),
        }
    }

    pub fn to_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

pub(crate) fn join_message(owner: &str, access_token: &str, msg_ref: u64) -> PhoenixMessage {
    PhoenixMessage::new(
        CHANNEL_TOPIC,
        "phx_join",
        json!({
            "config": {
                "broadcast": { "self": false },
                "presence": { "key": "" },
                "postgres_changes": [{
                    "event": "*",
                    "schema": "public",
                    "table": "bookmarks",
                    "filter": format!("user_id=eq.{owner}"),
                }],
            },
            "access_token": access_token,
        }),
        msg_ref,
    )
}

pub(crate) fn heartbeat_message(msg_ref: u64) -> PhoenixMessage {
    PhoenixMessage::new(PHOENIX_TOPIC, "heartbeat", json!({}), msg_ref)
}

pub(crate) fn leave_message(msg_ref: u64) -> PhoenixMessage {
    PhoenixMessage::new(CHANNEL_TOPIC, "phx_leave", json!({}), msg_ref)
}

pub(crate) fn access_token_message(access_token: &str, msg_ref: u64) -> PhoenixMessage {
    PhoenixMessage::new(
        CHANNEL_TOPIC,
        "access_token",
        json!({ "access_token": access_token }),
        msg_ref,
    )
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum LiveStatus {
    Connecting,
    Live,
    Closed,
}

/// What a decoded frame means for the dashboard.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Inbound {
    Change(Change),
    Joined,
    JoinFailed(String),
    ChannelClosed,
    /// Server answered the heartbeat with this ref.
    HeartbeatAck(Option<String>),
    Ignored,
}

#[derive(Deserialize)]
struct ChangeData {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    record: Option<Value>,
    #[serde(default)]
    old_record: Option<Value>,
}

fn decode_change(payload: &Value) -> Result<Change, ApiError> {
    let data = payload.get("data").cloned().unwrap_or(Value::Null);
    let data: ChangeData = serde_json::from_value(data).map_err(ApiError::parse)?;

    let row = |v: Option<Value>| -> Result<Bookmark, ApiError> {
        serde_json::from_value(v.unwrap_or(Value::Null)).map_err(ApiError::parse)
    };

    match data.kind.as_str() {
        "INSERT" => Ok(Change::Insert(row(data.record)?)),
        "UPDATE" => Ok(Change::Update(row(data.record)?)),
        "DELETE" => {
            // With default replica identity only the primary key survives.
            let id = data
                .old_record
                .as_ref()
                .and_then(|r| r.get("id"))
                .and_then(|v| v.as_str())
                .ok_or_else(|| ApiError::parse("delete event without old_record.id"))?;
            Ok(Change::Delete { id: id.to_string() })
        }
        other => Err(ApiError::parse(format!("unknown change type {other}"))),
    }
}

pub(crate) fn decode_frame(text: &str) -> Inbound {
    let msg: PhoenixMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            warn!(error = %e, "dropping malformed realtime frame");
            return Inbound::Ignored;
        }
    };

    if msg.topic == PHOENIX_TOPIC && msg.event == "phx_reply" {
        return Inbound::HeartbeatAck(msg.msg_ref);
    }
    if msg.topic != CHANNEL_TOPIC {
        return Inbound::Ignored;
    }

    match msg.event.as_str() {
        "postgres_changes" => match decode_change(&msg.payload) {
            Ok(change) => Inbound::Change(change),
            Err(e) => {
                warn!(error = %e, "dropping undecodable change event");
                Inbound::Ignored
            }
        },
        "phx_reply" => {
            let status = msg.payload.get("status").and_then(|v| v.as_str());
            match status {
                Some("ok") => Inbound::Joined,
                Some("error") => Inbound::JoinFailed(
                    msg.payload
                        .get("response")
                        .map(|r| r.to_string())
                        .unwrap_or_default(),
                ),
                _ => Inbound::Ignored,
            }
        }
        "phx_close" | "phx_error" => Inbound::ChannelClosed,
        _ => {
            debug!(event = %msg.event, "ignoring realtime event");
            Inbound::Ignored
        }
    }
}

/// Route a decoded frame into the store. Returns the new connection status, if it changed.
pub(crate) fn apply_inbound<S: StoreHandle>(store: &S, inbound: Inbound) -> Option<LiveStatus> {
    match inbound {
        Inbound::Change(change) => {
            debug!(?change, "realtime change");
            if store.mutate(|s| s.reconcile(change)).is_none() {
                debug!("realtime change after teardown; ignoring");
            }
            None
        }
        Inbound::Joined => Some(LiveStatus::Live),
        Inbound::JoinFailed(reason) => {
            warn!(%reason, "realtime join rejected");
            Some(LiveStatus::Closed)
        }
        Inbound::ChannelClosed => Some(LiveStatus::Closed),
        Inbound::HeartbeatAck(_) | Inbound::Ignored => None,
    }
}

/// Capped reconnect schedule, reset once a join succeeds.
#[derive(Debug, Default)]
pub(crate) struct Backoff {
    tries: usize,
}

impl Backoff {
    pub fn next_delay(&mut self) -> Duration {
        let step = self.tries.min(RECONNECT_STEPS_MS.len() - 1);
        self.tries += 1;
        Duration::from_millis(RECONNECT_STEPS_MS[step])
    }

    pub fn reset(&mut self) {
        self.tries = 0;
    }
}

/// Tracks the outstanding heartbeat. A heartbeat still unanswered when the
/// next one is due means the connection has gone quiet.
#[derive(Debug, Default)]
pub(crate) struct HeartbeatTracker {
    pending: Option<String>,
}

impl HeartbeatTracker {
    /// Record a heartbeat about to go out. Returns false, and sends nothing,
    /// when the previous one was never answered.
    pub fn beat(&mut self, msg_ref: u64) -> bool {
        if self.pending.take().is_some() {
            return false;
        }
        self.pending = Some(msg_ref.to_string());
        true
    }

    pub fn ack(&mut self, msg_ref: Option<&str>) {
        if self.pending.as_deref() == msg_ref {
            self.pending = None;
        }
    }
}

/// Live WebSocket subscription to the owner's bookmark changes.
///
/// Dropping it detaches every handler, stops the heartbeat, leaves the
/// channel and closes the socket, so no event is delivered afterwards.
pub(crate) struct RealtimeSubscription {
    socket: web_sys::WebSocket,
    next_ref: Rc<Cell<u64>>,
    heartbeat_id: Option<i32>,
    _on_open: Closure<dyn FnMut(web_sys::Event)>,
    _on_message: Closure<dyn FnMut(web_sys::MessageEvent)>,
    _on_close: Closure<dyn FnMut(web_sys::CloseEvent)>,
    _heartbeat: Closure<dyn FnMut()>,
}

fn bump(next_ref: &Cell<u64>) -> u64 {
    let r = next_ref.get() + 1;
    next_ref.set(r);
    r
}

impl RealtimeSubscription {
    pub fn connect(
        config: &EnvConfig,
        owner: &str,
        access_token: &str,
        on_inbound: impl Fn(Inbound) + 'static,
        on_closed: impl Fn() + 'static,
    ) -> Result<Self, ApiError> {
        let socket = web_sys::WebSocket::new(&config.realtime_url())
            .map_err(|e| ApiError::config(&format!("could not open realtime socket: {e:?}")))?;
        let next_ref = Rc::new(Cell::new(0u64));
        let tracker = Rc::new(RefCell::new(HeartbeatTracker::default()));

        let on_open = {
            let socket = socket.clone();
            let next_ref = next_ref.clone();
            let join = (owner.to_string(), access_token.to_string());
            Closure::wrap(Box::new(move |_ev: web_sys::Event| {
                let msg = join_message(&join.0, &join.1, bump(&next_ref));
                if let Err(e) = socket.send_with_str(&msg.to_text()) {
                    warn!(error = ?e, "realtime join send failed");
                }
            }) as Box<dyn FnMut(web_sys::Event)>)
        };

        let on_message = {
            let socket = socket.clone();
            let tracker = tracker.clone();
            Closure::wrap(Box::new(move |ev: web_sys::MessageEvent| {
                let Some(text) = ev.data().as_string() else {
                    return;
                };
                match decode_frame(&text) {
                    Inbound::HeartbeatAck(r) => tracker.borrow_mut().ack(r.as_deref()),
                    inbound @ (Inbound::ChannelClosed | Inbound::JoinFailed(_)) => {
                        on_inbound(inbound);
                        // Let `onclose` drive the reconnect.
                        let _ = socket.close();
                    }
                    inbound => on_inbound(inbound),
                }
            }) as Box<dyn FnMut(web_sys::MessageEvent)>)
        };

        let on_close = Closure::wrap(Box::new(move |ev: web_sys::CloseEvent| {
            info!(code = ev.code(), "realtime socket closed");
            on_closed();
        }) as Box<dyn FnMut(web_sys::CloseEvent)>);

        let heartbeat = {
            let socket = socket.clone();
            let next_ref = next_ref.clone();
            Closure::wrap(Box::new(move || {
                if socket.ready_state() != web_sys::WebSocket::OPEN {
                    return;
                }
                let r = bump(&next_ref);
                if tracker.borrow_mut().beat(r) {
                    let _ = socket.send_with_str(&heartbeat_message(r).to_text());
                } else {
                    warn!("realtime heartbeat timed out; closing socket");
                    let _ = socket.close();
                }
            }) as Box<dyn FnMut()>)
        };

        socket.set_onopen(Some(on_open.as_ref().unchecked_ref()));
        socket.set_onmessage(Some(on_message.as_ref().unchecked_ref()));
        socket.set_onclose(Some(on_close.as_ref().unchecked_ref()));

        let heartbeat_id = web_sys::window().and_then(|w| {
            w.set_interval_with_callback_and_timeout_and_arguments_0(
                heartbeat.as_ref().unchecked_ref(),
                HEARTBEAT_MS,
            )
            .ok()
        });

        info!(owner, "realtime subscription opened");

        Ok(Self {
            socket,
            next_ref,
            heartbeat_id,
            _on_open: on_open,
            _on_message: on_message,
            _on_close: on_close,
            _heartbeat: heartbeat,
        })
    }

    /// Hand a refreshed JWT to the channel so row filtering keeps working.
    pub fn update_access_token(&self, access_token: &str) {
        if self.socket.ready_state() == web_sys::WebSocket::OPEN {
            let msg = access_token_message(access_token, bump(&self.next_ref));
            let _ = self.socket.send_with_str(&msg.to_text());
        }
    }
}

impl Drop for RealtimeSubscription {
    fn drop(&mut self) {
        if let (Some(win), Some(id)) = (web_sys::window(), self.heartbeat_id.take()) {
            win.clear_interval_with_handle(id);
        }

        self.socket.set_onopen(None);
        self.socket.set_onmessage(None);
        self.socket.set_onclose(None);

        if self.socket.ready_state() == web_sys::WebSocket::OPEN {
            let _ = self
                .socket
                .send_with_str(&leave_message(bump(&self.next_ref)).to_text());
        }
        let _ = self.socket.close();
        debug!("realtime subscription closed");
    }
}

struct ChannelHooks {
    on_inbound: Box<dyn Fn(Inbound)>,
    on_status: Box<dyn Fn(LiveStatus)>,
    on_resync: Box<dyn Fn()>,
}

struct ChannelInner {
    config: EnvConfig,
    owner: String,
    access_token: String,
    subscription: Option<RealtimeSubscription>,
    backoff: Backoff,
    joined_once: bool,
    retry: Option<TimeoutHandle>,
}

/// A [`RealtimeSubscription`] that reopens itself after the socket drops.
///
/// Reconnects follow [`Backoff`]. Every successful join after the first
/// calls `on_resync`, so the caller can refetch whatever was missed offline.
pub(crate) struct LiveChannel {
    inner: Rc<RefCell<ChannelInner>>,
}

impl LiveChannel {
    pub fn open(
        config: &EnvConfig,
        owner: &str,
        access_token: &str,
        on_inbound: impl Fn(Inbound) + 'static,
        on_status: impl Fn(LiveStatus) + 'static,
        on_resync: impl Fn() + 'static,
    ) -> Self {
        let inner = Rc::new(RefCell::new(ChannelInner {
            config: config.clone(),
            owner: owner.to_string(),
            access_token: access_token.to_string(),
            subscription: None,
            backoff: Backoff::default(),
            joined_once: false,
            retry: None,
        }));
        let hooks = Rc::new(ChannelHooks {
            on_inbound: Box::new(on_inbound),
            on_status: Box::new(on_status),
            on_resync: Box::new(on_resync),
        });
        dial(&inner, hooks);
        Self { inner }
    }

    /// Hand a refreshed JWT to the channel. Also used for later reconnects.
    pub fn update_access_token(&self, access_token: &str) {
        let mut inner = self.inner.borrow_mut();
        inner.access_token = access_token.to_string();
        if let Some(sub) = &inner.subscription {
            sub.update_access_token(access_token);
        }
    }
}

impl Drop for LiveChannel {
    fn drop(&mut self) {
        if let Ok(mut inner) = self.inner.try_borrow_mut() {
            if let Some(retry) = inner.retry.take() {
                retry.clear();
            }
            inner.subscription.take();
        }
    }
}

fn dial(inner: &Rc<RefCell<ChannelInner>>, hooks: Rc<ChannelHooks>) {
    (hooks.on_status)(LiveStatus::Connecting);

    let on_inbound = {
        let weak = Rc::downgrade(inner);
        let hooks = hooks.clone();
        move |inbound: Inbound| {
            if inbound == Inbound::Joined {
                let rejoined = weak.upgrade().is_some_and(|inner| {
                    let mut inner = inner.borrow_mut();
                    inner.backoff.reset();
                    std::mem::replace(&mut inner.joined_once, true)
                });
                if rejoined {
                    info!("realtime rejoined; resyncing");
                    (hooks.on_resync)();
                }
            }
            (hooks.on_inbound)(inbound);
        }
    };

    let on_closed = {
        let weak = Rc::downgrade(inner);
        let hooks = hooks.clone();
        move || {
            (hooks.on_status)(LiveStatus::Closed);
            schedule_retry(&weak, hooks.clone());
        }
    };

    let connected = {
        let i = inner.borrow();
        RealtimeSubscription::connect(&i.config, &i.owner, &i.access_token, on_inbound, on_closed)
    };
    match connected {
        Ok(sub) => inner.borrow_mut().subscription = Some(sub),
        Err(e) => {
            warn!(error = %e, "realtime unavailable");
            (hooks.on_status)(LiveStatus::Closed);
            schedule_retry(&Rc::downgrade(inner), hooks);
        }
    }
}

fn schedule_retry(weak: &Weak<RefCell<ChannelInner>>, hooks: Rc<ChannelHooks>) {
    let Some(inner) = weak.upgrade() else {
        return;
    };
    let delay = inner.borrow_mut().backoff.next_delay();

    let retry_weak = weak.clone();
    let handle = set_timeout_with_handle(
        move || {
            if let Some(inner) = retry_weak.upgrade() {
                inner.borrow_mut().retry = None;
                dial(&inner, hooks);
            }
        },
        delay,
    );

    match handle {
        Ok(h) => {
            info!(delay_ms = delay.as_millis() as u64, "realtime reconnect scheduled");
            if let Some(old) = inner.borrow_mut().retry.replace(h) {
                old.clear();
            }
        }
        Err(e) => warn!(error = ?e, "could not schedule realtime reconnect"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fixtures::bm;
    use crate::store::BookmarkStore;
    use std::cell::RefCell;

    impl StoreHandle for RefCell<BookmarkStore> {
        fn mutate<R>(&self, f: impl FnOnce(&mut BookmarkStore) -> R) -> Option<R> {
            Some(f(&mut self.borrow_mut()))
        }
    }

    fn frame(event: &str, payload: Value) -> String {
        json!({ "topic": CHANNEL_TOPIC, "event": event, "payload": payload, "ref": null }).to_string()
    }

    fn change_frame(kind: &str, record: Value, old_record: Value) -> String {
        frame(
            "postgres_changes",
            json!({
                "ids": [1],
                "data": {
                    "schema": "public",
                    "table": "bookmarks",
                    "commit_timestamp": "2025-02-01T10:15:30Z",
                    "type": kind,
                    "record": record,
                    "old_record": old_record,
                    "errors": null
                }
            }),
        )
    }

    fn row(id: &str) -> Value {
        json!({
            "id": id,
            "title": "Design Inspiration",
            "url": "https://example.com",
            "created_at": "2025-02-01 10:15:30.123+00",
            "user_id": "u-1"
        })
    }

    #[test]
    fn test_join_message_filters_by_owner() {
        let m = join_message("u-1", "jwt", 1);
        let v: Value = serde_json::from_str(&m.to_text()).unwrap();
        assert_eq!(v["topic"], CHANNEL_TOPIC);
        assert_eq!(v["event"], "phx_join");
        assert_eq!(v["ref"], "1");
        assert_eq!(v["payload"]["access_token"], "jwt");
        let pc = &v["payload"]["config"]["postgres_changes"][0];
        assert_eq!(pc["table"], "bookmarks");
        assert_eq!(pc["filter"], "user_id=eq.u-1");
        assert_eq!(pc["event"], "*");
    }

    #[test]
    fn test_heartbeat_goes_to_phoenix_topic() {
        let v: Value = serde_json::from_str(&heartbeat_message(7).to_text()).unwrap();
        assert_eq!(v["topic"], "phoenix");
        assert_eq!(v["event"], "heartbeat");
        assert_eq!(v["ref"], "7");
    }

    #[test]
    fn test_decode_insert() {
        match decode_frame(&change_frame("INSERT", row("s-1"), json!({}))) {
            Inbound::Change(Change::Insert(b)) => {
                assert_eq!(b.id, "s-1");
                assert_eq!(b.owner, "u-1");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_decode_update() {
        assert!(matches!(
            decode_frame(&change_frame("UPDATE", row("s-1"), json!({"id": "s-1"}))),
            Inbound::Change(Change::Update(_))
        ));
    }

    #[test]
    fn test_decode_delete_uses_old_record_id() {
        assert_eq!(
            decode_frame(&change_frame("DELETE", Value::Null, json!({"id": "s-1"}))),
            Inbound::Change(Change::Delete { id: "s-1".into() })
        );
    }

    #[test]
    fn test_decode_replies_and_noise() {
        assert_eq!(
            decode_frame(&frame("phx_reply", json!({"status": "ok", "response": {}}))),
            Inbound::Joined
        );
        assert!(matches!(
            decode_frame(&frame("phx_reply", json!({"status": "error", "response": {"reason": "denied"}}))),
            Inbound::JoinFailed(_)
        ));
        assert_eq!(decode_frame(&frame("phx_close", json!({}))), Inbound::ChannelClosed);
        assert_eq!(decode_frame(&frame("presence_state", json!({}))), Inbound::Ignored);
        assert_eq!(decode_frame("not json"), Inbound::Ignored);
        assert_eq!(
            decode_frame(&change_frame("INSERT", json!({"id": 1}), json!({}))),
            Inbound::Ignored
        );

        let other_topic = json!({"topic": "realtime:other", "event": "phx_reply", "payload": {"status": "ok"}, "ref": "2"});
        assert_eq!(decode_frame(&other_topic.to_string()), Inbound::Ignored);
    }

    #[test]
    fn test_decode_heartbeat_reply() {
        let reply = json!({"topic": "phoenix", "event": "phx_reply", "payload": {"status": "ok", "response": {}}, "ref": "2"});
        assert_eq!(
            decode_frame(&reply.to_string()),
            Inbound::HeartbeatAck(Some("2".into()))
        );
    }

    #[test]
    fn test_heartbeat_tracker_detects_silent_connection() {
        let mut t = HeartbeatTracker::default();
        assert!(t.beat(1));
        t.ack(Some("1"));
        assert!(t.beat(2));

        // A reply to some other ref does not count.
        t.ack(Some("1"));
        assert!(!t.beat(3));
    }

    #[test]
    fn test_backoff_is_capped_and_resets() {
        let mut b = Backoff::default();
        let delays: Vec<u128> = (0..6).map(|_| b.next_delay().as_millis()).collect();
        assert_eq!(delays, vec![1_000, 2_000, 5_000, 10_000, 10_000, 10_000]);

        b.reset();
        assert_eq!(b.next_delay(), Duration::from_millis(1_000));
    }

    #[test]
    fn test_apply_inbound_merges_into_store() {
        let store = RefCell::new(BookmarkStore::new());
        store.borrow_mut().replace_all(vec![bm("a", 1)]);

        assert_eq!(apply_inbound(&store, Inbound::Joined), Some(LiveStatus::Live));

        let insert = decode_frame(&change_frame("INSERT", row("s-1"), json!({})));
        assert_eq!(apply_inbound(&store, insert.clone()), None);
        // Redelivery is harmless.
        apply_inbound(&store, insert);
        assert_eq!(store.borrow().len(), 2);
        assert_eq!(store.borrow().items()[0].id, "s-1");

        let gone = Inbound::Change(Change::Delete { id: "never-seen".into() });
        apply_inbound(&store, gone);
        assert_eq!(store.borrow().len(), 2);

        assert_eq!(
            apply_inbound(&store, Inbound::ChannelClosed),
            Some(LiveStatus::Closed)
        );
    }
}
