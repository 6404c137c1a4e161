// ABOUTME: Glue between the streaming parser, the artifact store and the action runner.
// ABOUTME: Feed it cumulative message text; it records artifacts and schedules actions in order.

use crate::action::{ActionCallbackData, ArtifactCallbackData};
use crate::artifact::{ArtifactRecord, ArtifactStore};
use crate::parser::{ParseOutput, ParserCallbacks, StreamingMessageParser};
use crate::runner::ActionRunner;

pub struct Workbench {
    parser: StreamingMessageParser,
    runner: ActionRunner,
    artifacts: ArtifactStore,
}

/// Parser callbacks that forward into the runner and the artifact store.
struct Dispatch<'a> {
    runner: &'a ActionRunner,
    artifacts: &'a mut ArtifactStore,
}

impl Dispatch<'_> {
    fn schedule(&self, data: &ActionCallbackData, streaming: bool) {
        if let Err(e) = self.runner.schedule_action(data, streaming) {
            tracing::warn!(action_id = %data.action_id, error = %e, "Failed to schedule action");
        }
    }
}

impl ParserCallbacks for Dispatch<'_> {
    fn on_artifact_open(&mut self, data: &ArtifactCallbackData) {
        self.artifacts.open(data);
    }

    fn on_artifact_close(&mut self, data: &ArtifactCallbackData) {
        self.artifacts.close(&data.id);
    }

    fn on_action_open(&mut self, data: &ActionCallbackData) {
        self.artifacts.push_action(&data.artifact_id, &data.action_id);
        self.runner.add_action(data);
    }

    fn on_action_stream(&mut self, data: &ActionCallbackData) {
        if !data.suppress_side_effects {
            self.schedule(data, true);
        }
    }

    fn on_action_close(&mut self, data: &ActionCallbackData) {
        if data.suppress_side_effects {
            self.runner.record_action(data);
        } else {
            self.schedule(data, false);
        }
    }
}

impl Workbench {
    pub fn new(runner: ActionRunner) -> Self {
        Self::with_parser(StreamingMessageParser::new(), runner)
    }

    pub fn with_parser(parser: StreamingMessageParser, runner: ActionRunner) -> Self {
        Self {
            parser,
            runner,
            artifacts: ArtifactStore::new(),
        }
    }

    /// Parse the cumulative text of `message_id`. Actions are queued, not awaited.
    pub fn on_chunk(
        &mut self,
        message_id: &str,
        text: &str,
        suppress_side_effects: bool,
    ) -> ParseOutput {
        let mut dispatch = Dispatch {
            runner: &self.runner,
            artifacts: &mut self.artifacts,
        };
        self.parser
            .parse(message_id, text, suppress_side_effects, &mut dispatch)
    }

    pub fn runner(&self) -> &ActionRunner {
        &self.runner
    }

    pub async fn wait_idle(&self) {
        self.runner.wait_idle().await;
    }

    pub fn artifact(&self, artifact_id: &str) -> Option<&ArtifactRecord> {
        self.artifacts.get(artifact_id)
    }

    pub fn artifacts(&self) -> impl Iterator<Item = &ArtifactRecord> {
        self.artifacts.iter()
    }

    pub fn artifacts_for_message(&self, message_id: &str) -> Vec<&ArtifactRecord> {
        self.artifacts.for_message(message_id)
    }

    /// True once the artifact is closed and every action in it is terminal.
    pub fn all_actions_finished(&self, artifact_id: &str) -> bool {
        let Some(record) = self.artifacts.get(artifact_id) else {
            return false;
        };
        record.closed
            && record.action_ids.iter().all(|id| {
                self.runner
                    .snapshot(id)
                    .map(|state| state.status.is_terminal())
                    .unwrap_or(false)
            })
    }

    /// Abort every action that has not finished yet.
    pub fn abort_all(&self) {
        for state in self.runner.actions() {
            if !state.status.is_terminal() {
                self.runner.abort(&state.action_id);
            }
        }
    }
}
