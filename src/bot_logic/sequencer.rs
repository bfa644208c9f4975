use tracing::debug;

use super::composer::compose_parameters;
use super::models::{RenderedMessage, UserProfile};
use super::renderer::Renderer;
use crate::database::ContentStore;

/// Builds the full reply for a payload key: fetch, compose, render.
#[derive(Debug, Clone, Default)]
pub struct Sequencer {
    renderer: Renderer,
}

impl Sequencer {
    pub fn new(renderer: Renderer) -> Self {
        Sequencer { renderer }
    }

    pub async fn build_sequence<S: ContentStore>(
        &self,
        store: &S,
        payload: &str,
        profile: &UserProfile,
    ) -> Vec<RenderedMessage> {
        let entries = store.fetch_entries(payload).await;
        if entries.is_empty() {
            debug!(payload, "no active dialogue for payload");
            return Vec::new();
        }

        let params = compose_parameters(payload, profile);
        entries
            .iter()
            .enumerate()
            .filter_map(|(position, entry)| {
                let rendered = self.renderer.render(entry, &params);
                if rendered.is_none() {
                    debug!(payload, position, message_type = ?entry.message_type, "skipping entry with unknown type");
                }
                rendered
            })
            .collect()
    }
}
