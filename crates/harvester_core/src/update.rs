use crate::{Effect, Msg, RunState, SessionState};

/// Pure update function: applies a message to run state and returns any effects.
pub fn update(mut state: RunState, msg: Msg) -> (RunState, Vec<Effect>) {
    let effects = match msg {
        Msg::Resume(checkpoint) => {
            // Resuming after targets were handed out would re-run completed work.
            if state.session() == SessionState::Idle {
                state.resume_from(checkpoint);
            }
            Vec::new()
        }
        Msg::TargetsLoaded(targets) => {
            match state.session() {
                SessionState::Idle | SessionState::Running => {
                    state.load_targets(targets);
                }
                SessionState::Stopping
                | SessionState::Stopped
                | SessionState::Finished
                | SessionState::Aborted => {}
            }
            Vec::new()
        }
        Msg::WorkerReady => match state.start_next() {
            Some((target_id, url, resume)) => vec![Effect::StartTarget {
                target_id,
                url,
                resume,
            }],
            None => Vec::new(),
        },
        Msg::PageProgress { target_id, page } => {
            state.record_page(target_id, page);
            Vec::new()
        }
        Msg::RecordsProcessed { accepted, rejected } => {
            state.record_batch(accepted, &rejected);
            Vec::new()
        }
        Msg::TargetFinished { target_id, outcome } => {
            let terminal = state.finish_target(&target_id, &outcome);
            if terminal && state.failure_limit_reached() && state.session() == SessionState::Running {
                state.set_session(SessionState::Aborted);
                vec![Effect::AbortRun {
                    consecutive_failures: state.consecutive_failures(),
                }]
            } else if terminal && state.checkpoint_due() {
                vec![Effect::SaveCheckpoint]
            } else {
                Vec::new()
            }
        }
        Msg::GovernorObserved(governor) => {
            state.set_governor(governor);
            Vec::new()
        }
        Msg::StopRequested => {
            if state.session() == SessionState::Running {
                state.set_session(SessionState::Stopping);
            }
            Vec::new()
        }
        Msg::WorkersDrained => {
            match state.session() {
                SessionState::Stopping => state.set_session(SessionState::Stopped),
                SessionState::Aborted | SessionState::Stopped => {}
                SessionState::Idle | SessionState::Running | SessionState::Finished => {
                    state.set_session(SessionState::Finished)
                }
            }
            // The final save also captures targets interrupted while draining.
            vec![Effect::SaveCheckpoint]
        }
    };

    (state, effects)
}
