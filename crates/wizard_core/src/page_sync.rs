use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{info, warn};
use url::Url;

use crate::{catalog, progress::ProgressStore};

/// Events emitted by the external page-rendering engine. The engine is
/// a black box to this crate: it renders pages, emits these, and
/// accepts page-index jumps.
#[derive(Debug, Clone)]
pub enum SurveyEvent {
    PageChanged {
        page_name: String,
    },
    ValueChanged {
        page_name: String,
        fields: Map<String, Value>,
    },
    Completed {
        data: Map<String, Value>,
    },
}

pub trait SurveyEngineHandle: Send + Sync {
    /// Programmatic jump. The engine emits a `PageChanged` for it like
    /// for any user navigation.
    fn jump_to_page(&self, page_index: usize);
    fn subscribe_events(&self) -> broadcast::Receiver<SurveyEvent>;
}

/// The browser-addressable location. Only replace semantics: rewriting
/// the `page` parameter for every intra-wizard step must not grow the
/// back stack.
pub trait LocationProvider: Send + Sync {
    fn current_url(&self) -> String;
    fn replace_url(&self, url: String);
}

#[async_trait]
pub trait CompletionHandler: Send + Sync {
    async fn on_complete(&self, data: Map<String, Value>);
}

pub struct NoopCompletionHandler;

#[async_trait]
impl CompletionHandler for NoopCompletionHandler {
    async fn on_complete(&self, _data: Map<String, Value>) {}
}

/// Keeps the page engine's current page, the URL's `page` query
/// parameter, and the progress store's current section mutually
/// consistent, in both directions.
pub struct PageSyncAdapter {
    progress: Arc<ProgressStore>,
    engine: Arc<dyn SurveyEngineHandle>,
    location: Arc<dyn LocationProvider>,
    on_complete: Arc<dyn CompletionHandler>,
    /// Re-entrancy guard: set around the mount-time programmatic jump
    /// so the `PageChanged` it triggers does not rewrite a URL that
    /// already addresses that page.
    suppress_rewrite: AtomicBool,
    event_task: Mutex<Option<JoinHandle<()>>>,
}

impl PageSyncAdapter {
    pub fn new(
        progress: Arc<ProgressStore>,
        engine: Arc<dyn SurveyEngineHandle>,
        location: Arc<dyn LocationProvider>,
        on_complete: Arc<dyn CompletionHandler>,
    ) -> Arc<Self> {
        Arc::new(Self {
            progress,
            engine,
            location,
            on_complete,
            suppress_rewrite: AtomicBool::new(false),
            event_task: Mutex::new(None),
        })
    }

    /// Restores the engine's page from the URL, then starts pumping
    /// engine events into the progress store and the location.
    pub async fn mount(self: &Arc<Self>) {
        // Subscribe before the programmatic jump so its PageChanged is
        // buffered rather than lost.
        let events = self.engine.subscribe_events();

        match page_param(&self.location.current_url()) {
            Some(page_name) => match catalog::page_index(&page_name) {
                Some(page_index) => {
                    self.suppress_rewrite.store(true, Ordering::SeqCst);
                    self.engine.jump_to_page(page_index);
                    info!(page = %page_name, "page-sync: restored page from url");
                }
                None => {
                    warn!(page = %page_name, "page-sync: unknown page in url, falling back to first page");
                    self.suppress_rewrite.store(true, Ordering::SeqCst);
                    self.engine.jump_to_page(0);
                }
            },
            // Absence means first page; the engine is already there.
            None => {}
        }

        let task = self.spawn_event_pump(events);
        let previous = self.event_task.lock().await.replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Stops event pumping (component unmount). In-flight uploads are
    /// cancelled separately via their token.
    pub async fn detach(&self) {
        if let Some(task) = self.event_task.lock().await.take() {
            task.abort();
        }
    }

    fn spawn_event_pump(
        self: &Arc<Self>,
        mut events: broadcast::Receiver<SurveyEvent>,
    ) -> JoinHandle<()> {
        let adapter = Arc::clone(self);
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                match event {
                    SurveyEvent::PageChanged { page_name } => {
                        if let Err(err) = adapter.progress.visit_page(&page_name).await {
                            warn!("page-sync: failed to record page change: {err}");
                            continue;
                        }
                        if adapter.suppress_rewrite.swap(false, Ordering::SeqCst) {
                            continue;
                        }
                        let current = adapter.location.current_url();
                        match with_page_param(&current, &page_name) {
                            Some(url) => adapter.location.replace_url(url),
                            None => {
                                warn!(url = %current, "page-sync: cannot rewrite malformed url");
                            }
                        }
                    }
                    SurveyEvent::ValueChanged { page_name, fields } => {
                        if let Err(err) = adapter.progress.set_form_data(&page_name, fields).await {
                            warn!("page-sync: failed to save form data: {err}");
                        }
                    }
                    SurveyEvent::Completed { data } => {
                        if let Err(err) = adapter.progress.mark_final_section_completed().await {
                            warn!("page-sync: failed to complete final section: {err}");
                        }
                        adapter.on_complete.on_complete(data).await;
                    }
                }
            }
        })
    }
}

/// The `page` query parameter of `url`, if any.
pub fn page_param(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed
        .query_pairs()
        .find(|(key, _)| key == "page")
        .map(|(_, value)| value.into_owned())
}

/// `url` with its `page` query parameter replaced by `page_name`,
/// preserving every other parameter.
fn with_page_param(url: &str, page_name: &str) -> Option<String> {
    let mut parsed = Url::parse(url).ok()?;
    let retained: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(key, _)| key != "page")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    {
        let mut query = parsed.query_pairs_mut();
        query.clear();
        for (key, value) in &retained {
            query.append_pair(key, value);
        }
        query.append_pair("page", page_name);
    }
    Some(parsed.to_string())
}

#[cfg(test)]
#[path = "tests/page_sync_tests.rs"]
mod tests;
