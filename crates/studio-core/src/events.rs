//! Cross-window event bus.
//!
//! Windows of the application share one [`EventBus`]; each subscribes to the event kinds it
//! reacts to and drains them either synchronously ([`Subscription::try_next`]) or as a
//! [`Stream`].

use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures::channel::mpsc;
use futures::{FutureExt, Stream, StreamExt};

use crate::settings::{Appearance, ExportFormat, FontSettings, Locale, RenderEngine};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    Appearance(Appearance),
    Fonts(FontSettings),
    Locale(Locale),
    RenderEngine(RenderEngine),
    ChartThemes {
        light: String,
        dark: String,
    },
    Export {
        png_quality: u8,
        default_format: ExportFormat,
    },
    /// The template library was restored to its built-in contents at `at_ms` (Unix millis).
    TemplateLibraryReset {
        at_ms: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Appearance,
    Fonts,
    Locale,
    RenderEngine,
    ChartThemes,
    Export,
    TemplateLibraryReset,
}

impl EventKind {
    pub const ALL: [EventKind; 7] = [
        EventKind::Appearance,
        EventKind::Fonts,
        EventKind::Locale,
        EventKind::RenderEngine,
        EventKind::ChartThemes,
        EventKind::Export,
        EventKind::TemplateLibraryReset,
    ];
}

impl AppEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            AppEvent::Appearance(_) => EventKind::Appearance,
            AppEvent::Fonts(_) => EventKind::Fonts,
            AppEvent::Locale(_) => EventKind::Locale,
            AppEvent::RenderEngine(_) => EventKind::RenderEngine,
            AppEvent::ChartThemes { .. } => EventKind::ChartThemes,
            AppEvent::Export { .. } => EventKind::Export,
            AppEvent::TemplateLibraryReset { .. } => EventKind::TemplateLibraryReset,
        }
    }
}

struct Subscriber {
    kinds: Vec<EventKind>,
    tx: mpsc::UnboundedSender<AppEvent>,
}

impl Subscriber {
    fn wants(&self, kind: EventKind) -> bool {
        self.kinds.contains(&kind)
    }
}

#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Subscriber>> {
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Subscribes to the given kinds; an empty slice subscribes to every kind.
    pub fn subscribe(&self, kinds: &[EventKind]) -> Subscription {
        let (tx, rx) = mpsc::unbounded();
        let kinds = if kinds.is_empty() {
            EventKind::ALL.to_vec()
        } else {
            kinds.to_vec()
        };
        self.lock().push(Subscriber { kinds, tx });
        Subscription { rx }
    }

    /// Delivers `event` to every live subscriber interested in its kind and returns how many
    /// received it. Subscribers whose [`Subscription`] was dropped are pruned.
    pub fn publish(&self, event: AppEvent) -> usize {
        let kind = event.kind();
        let mut subscribers = self.lock();
        subscribers.retain(|s| !s.tx.is_closed());
        let mut delivered = 0;
        for sub in subscribers.iter().filter(|s| s.wants(kind)) {
            if sub.tx.unbounded_send(event.clone()).is_ok() {
                delivered += 1;
            }
        }
        tracing::debug!("published {kind:?} to {delivered} subscriber(s)");
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().iter().filter(|s| !s.tx.is_closed()).count()
    }
}

#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<AppEvent>,
}

impl Subscription {
    /// Returns the next queued event without waiting.
    pub fn try_next(&mut self) -> Option<AppEvent> {
        self.rx.next().now_or_never().flatten()
    }

    pub fn drain(&mut self) -> Vec<AppEvent> {
        std::iter::from_fn(|| self.try_next()).collect()
    }
}

impl Stream for Subscription {
    type Item = AppEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<AppEvent>> {
        self.rx.poll_next_unpin(cx)
    }
}
