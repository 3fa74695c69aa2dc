//! UseCase: ライブチャンネルイベントの配信
//!
//! チャンネルは型付きイベントを 1 本のストリームとして流すだけで、誰が購読して
//! いるかを知りません。購読者（キャッシュ無効化、近接検知など）はここに登録され、
//! 到着順に 1 件ずつ同期的に処理します。

use crate::domain::{ChannelEvent, ProcessVisibility, Timestamp};

/// イベント処理時点のコンテキスト
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchContext {
    pub visibility: ProcessVisibility,
    pub now: Timestamp,
}

/// ライブチャンネルイベントの購読者
pub trait ChannelEventListener: Send {
    /// ログ用の名前
    fn name(&self) -> &'static str;

    fn on_event(&mut self, event: &ChannelEvent, context: &DispatchContext);
}

/// 登録順にイベントを配信する
#[derive(Default)]
pub struct EventDispatcher {
    listeners: Vec<Box<dyn ChannelEventListener>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, listener: Box<dyn ChannelEventListener>) {
        tracing::debug!(listener = listener.name(), "Registered channel event listener");
        self.listeners.push(listener);
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn dispatch(&mut self, event: &ChannelEvent, context: &DispatchContext) {
        for listener in self.listeners.iter_mut() {
            tracing::trace!(listener = listener.name(), event = event.name(), "Dispatching");
            listener.on_event(event, context);
        }
    }
}
