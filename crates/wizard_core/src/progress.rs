use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use shared::{
    domain::{ApplicationId, ApplicationType, Section},
    error::WizardError,
};
use storage::{save_json, StateStore};
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

use crate::catalog;

/// Persistence namespace for per-application form data.
pub const PROGRESS_STORE_NAMESPACE: &str = "application-store";

/// One step's worth of submitted form fields.
pub type FormRecord = Map<String, Value>;
/// Step/page name to submitted fields for one application.
pub type FormData = HashMap<String, FormRecord>;

#[derive(Debug, Clone)]
pub enum ProgressEvent {
    SectionChanged {
        application_id: ApplicationId,
        section_index: usize,
    },
    SectionCompleted {
        application_id: ApplicationId,
        section_index: usize,
    },
    FormDataChanged {
        application_id: ApplicationId,
        step: String,
    },
}

/// Wizard position and per-step form values for one loan application.
#[derive(Debug, Clone)]
pub struct Application {
    pub id: ApplicationId,
    pub application_type: ApplicationType,
    pub sections: Vec<Section>,
    pub current_section_index: usize,
    pub form_data: FormData,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    /// Pages seen this session, grouped by section. The set only grows,
    /// which is what keeps per-section progress non-decreasing.
    visited_pages: HashMap<usize, HashSet<String>>,
}

/// Only form data survives a reload; section progress and the visited
/// set are session-scoped.
#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedProgress {
    #[serde(default)]
    form_data: HashMap<ApplicationId, FormData>,
}

struct ProgressState {
    applications: HashMap<ApplicationId, Application>,
    current: Option<ApplicationId>,
    /// Form data loaded from the persistence layer for applications not
    /// yet selected this session.
    restored_form_data: HashMap<ApplicationId, FormData>,
}

/// Single source of truth for wizard position and per-step form values,
/// keyed by application id. Explicitly constructed and injected; all
/// mutation goes through the listed operations.
pub struct ProgressStore {
    store: Arc<dyn StateStore>,
    state: Mutex<ProgressState>,
    events: broadcast::Sender<ProgressEvent>,
}

impl ProgressStore {
    /// Hydrates previously persisted form data and returns a handle.
    /// Storage-layer failures propagate; an unreadable payload is
    /// discarded, matching what a browser does with corrupt storage.
    pub async fn initialize(store: Arc<dyn StateStore>) -> Result<Arc<Self>> {
        let restored_form_data = match store.load_raw(PROGRESS_STORE_NAMESPACE).await? {
            Some(raw) => match serde_json::from_str::<PersistedProgress>(&raw) {
                Ok(persisted) => persisted.form_data,
                Err(err) => {
                    warn!("progress: discarding unreadable persisted state: {err}");
                    HashMap::new()
                }
            },
            None => HashMap::new(),
        };

        let (events, _) = broadcast::channel(256);
        Ok(Arc::new(Self {
            store,
            state: Mutex::new(ProgressState {
                applications: HashMap::new(),
                current: None,
                restored_form_data,
            }),
            events,
        }))
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ProgressEvent> {
        self.events.subscribe()
    }

    /// Idempotent: creates the application with its fixed section
    /// template if absent, then makes it current for subsequent
    /// operations. The type segment comes from the URL path, so an
    /// unknown value is a typed error, not a panic.
    pub async fn select_application(
        &self,
        id: &ApplicationId,
        type_segment: &str,
    ) -> Result<(), WizardError> {
        let application_type = ApplicationType::parse(type_segment)
            .ok_or_else(|| WizardError::UnknownApplicationType(type_segment.to_string()))?;

        let mut state = self.state.lock().await;
        if !state.applications.contains_key(id) {
            let form_data = state.restored_form_data.remove(id).unwrap_or_default();
            let now = Utc::now();
            state.applications.insert(
                id.clone(),
                Application {
                    id: id.clone(),
                    application_type,
                    sections: catalog::section_template(application_type),
                    current_section_index: 0,
                    form_data,
                    created_at: now,
                    last_modified: now,
                    visited_pages: HashMap::new(),
                },
            );
            info!(
                application_id = %id,
                application_type = type_segment,
                "progress: application created"
            );
        }
        state.current = Some(id.clone());
        Ok(())
    }

    /// Cloned snapshot of the current application for the UI.
    pub async fn current_application(&self) -> Option<Application> {
        let state = self.state.lock().await;
        let id = state.current.as_ref()?;
        state.applications.get(id).cloned()
    }

    /// Sets the active section, clamping out-of-range input instead of
    /// failing: the index is driven by untrusted URL input. Does not
    /// touch `progress`/`completed`. Returns the effective index.
    pub async fn set_current_section(&self, index: usize) -> Result<usize, WizardError> {
        let (application_id, effective) = {
            let mut state = self.state.lock().await;
            let application = current_mut(&mut state)?;
            let effective = clamp_index(index, application.sections.len());
            if effective != index {
                warn!(
                    requested = index,
                    effective, "progress: section index out of range, clamped"
                );
            }
            application.current_section_index = effective;
            application.last_modified = Utc::now();
            (application.id.clone(), effective)
        };

        let _ = self.events.send(ProgressEvent::SectionChanged {
            application_id,
            section_index: effective,
        });
        Ok(effective)
    }

    /// Records that the user reached `page_name`: resolves its section,
    /// makes that section current, and raises the section's progress
    /// fraction if this visit advanced it. Re-viewing a page never
    /// lowers progress.
    pub async fn visit_page(&self, page_name: &str) -> Result<usize, WizardError> {
        let (application_id, section_index) = {
            let mut state = self.state.lock().await;
            let application = current_mut(&mut state)?;
            let section_index = clamp_index(
                catalog::section_index_for_page(page_name),
                application.sections.len(),
            );

            application
                .visited_pages
                .entry(section_index)
                .or_default()
                .insert(page_name.to_string());
            let visited = application.visited_pages[&section_index].len();

            let section = &mut application.sections[section_index];
            let fraction = progress_fraction(visited, section.step_count);
            if fraction > section.progress {
                section.progress = fraction;
            }

            application.current_section_index = section_index;
            application.last_modified = Utc::now();
            (application.id.clone(), section_index)
        };

        let _ = self.events.send(ProgressEvent::SectionChanged {
            application_id,
            section_index,
        });
        Ok(section_index)
    }

    /// Shallow-merges `fields` into `form_data[step]`, creating the
    /// entry if absent. Keys not present in `fields` are kept.
    pub async fn set_form_data(&self, step: &str, fields: FormRecord) -> Result<(), WizardError> {
        let application_id = {
            let mut state = self.state.lock().await;
            let application = current_mut(&mut state)?;
            let record = application.form_data.entry(step.to_string()).or_default();
            for (key, value) in fields {
                record.insert(key, value);
            }
            application.last_modified = Utc::now();
            application.id.clone()
        };

        self.persist().await;
        let _ = self.events.send(ProgressEvent::FormDataChanged {
            application_id,
            step: step.to_string(),
        });
        Ok(())
    }

    /// Marks the section complete and its progress full. Monotonic: a
    /// repeat call is a no-op, and nothing ever unsets it.
    pub async fn mark_section_completed(&self, index: usize) -> Result<(), WizardError> {
        let completed = {
            let mut state = self.state.lock().await;
            let application = current_mut(&mut state)?;
            let effective = clamp_index(index, application.sections.len());
            let section = &mut application.sections[effective];
            if section.completed {
                None
            } else {
                section.completed = true;
                section.progress = 1.0;
                application.last_modified = Utc::now();
                Some((application.id.clone(), effective))
            }
        };

        if let Some((application_id, section_index)) = completed {
            info!(
                application_id = %application_id,
                section_index, "progress: section completed"
            );
            let _ = self.events.send(ProgressEvent::SectionCompleted {
                application_id,
                section_index,
            });
        }
        Ok(())
    }

    /// Completion shorthand for the survey's terminal event.
    pub async fn mark_final_section_completed(&self) -> Result<(), WizardError> {
        let last = {
            let mut state = self.state.lock().await;
            current_mut(&mut state)?.sections.len().saturating_sub(1)
        };
        self.mark_section_completed(last).await
    }

    /// `min(1, steps visited in section / step count)`, from the
    /// session's visited set. Out-of-range indices clamp like
    /// [`Self::set_current_section`].
    pub async fn compute_section_progress(&self, index: usize) -> Result<f32, WizardError> {
        let state = self.state.lock().await;
        let id = state
            .current
            .clone()
            .ok_or(WizardError::NoApplicationSelected)?;
        let application = state
            .applications
            .get(&id)
            .ok_or(WizardError::NoApplicationSelected)?;
        let effective = clamp_index(index, application.sections.len());
        let visited = application
            .visited_pages
            .get(&effective)
            .map(HashSet::len)
            .unwrap_or(0);
        Ok(progress_fraction(
            visited,
            application.sections[effective].step_count,
        ))
    }

    /// Removes the application record entirely. Irreversible; also
    /// drops its persisted form data.
    pub async fn delete_application(&self, id: &ApplicationId) {
        {
            let mut state = self.state.lock().await;
            state.applications.remove(id);
            state.restored_form_data.remove(id);
            if state.current.as_ref() == Some(id) {
                state.current = None;
            }
        }
        info!(application_id = %id, "progress: application deleted");
        self.persist().await;
    }

    /// Writes the `{ form_data }` payload for every known application.
    /// Persistence failure is logged, not raised: the in-memory store
    /// stays authoritative for the session either way.
    async fn persist(&self) {
        let snapshot = {
            let state = self.state.lock().await;
            let mut form_data = state.restored_form_data.clone();
            for (id, application) in &state.applications {
                form_data.insert(id.clone(), application.form_data.clone());
            }
            PersistedProgress { form_data }
        };

        if let Err(err) = save_json(self.store.as_ref(), PROGRESS_STORE_NAMESPACE, &snapshot).await
        {
            warn!("progress: failed to persist form data: {err:#}");
        }
    }
}

fn current_mut(state: &mut ProgressState) -> Result<&mut Application, WizardError> {
    let id = state
        .current
        .clone()
        .ok_or(WizardError::NoApplicationSelected)?;
    state
        .applications
        .get_mut(&id)
        .ok_or(WizardError::NoApplicationSelected)
}

fn clamp_index(index: usize, len: usize) -> usize {
    index.min(len.saturating_sub(1))
}

fn progress_fraction(visited: usize, step_count: u32) -> f32 {
    (visited as f32 / step_count.max(1) as f32).min(1.0)
}

#[cfg(test)]
#[path = "tests/progress_tests.rs"]
mod tests;
