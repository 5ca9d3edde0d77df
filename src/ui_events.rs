use crate::app_state::State;
use crate::error::MorphError;

pub type SelectionReply = flume::Sender<Result<(), MorphError>>;

#[derive(Debug)]
pub enum UserCommand {
    /// Morph to the model at this index.
    SelectModel(usize),
    /// Same as `SelectModel`, with the outcome sent back to the caller.
    SelectModelWithReply(usize, SelectionReply),
    /// Morph to the model after the active one, wrapping around.
    NextModel,
    StateInitialized, // Notifies App that State setup is complete
}

impl State {
    pub fn process_command(&mut self, command: UserCommand) {
        let (target, reply) = match command {
            UserCommand::SelectModel(index) => (index, None),
            UserCommand::SelectModelWithReply(index, reply) => (index, Some(reply)),
            UserCommand::NextModel => ((self.morph.active_model() + 1) % self.morph.model_count(), None),
            UserCommand::StateInitialized => {
                // This command is handled in App::user_event
                return;
            }
        };

        report_selection(target, self.morph.select_model(target), reply);
    }
}

/// Logs the outcome of a model selection and forwards it to whoever asked.
fn report_selection(target: usize, result: Result<(), MorphError>, reply: Option<SelectionReply>) {
    match &result {
        Ok(()) => log::info!("Selected model {}", target),
        Err(e @ MorphError::Busy { .. }) => log::warn!("Ignoring model selection: {}", e),
        Err(e) => log::error!("Rejected model selection: {}", e),
    }

    if let Some(reply) = reply {
        if reply.send(result).is_err() {
            log::warn!("Caller stopped waiting for selection of model {}", target);
        }
    }
}
