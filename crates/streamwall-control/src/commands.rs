//! Command dispatch.

use crate::engine::{CommandOutcome, Engine};
use crate::error::{Error, Result};
use streamwall_protocols::{Command, Role};
use streamwall_streams::StreamData;
use tracing::{debug, info, warn};
use url::Url;

impl Engine {
    /// Check `role` against `command` and apply it.
    ///
    /// Nothing is changed when an error is returned.
    pub(crate) fn handle_command(&mut self, role: Role, command: Command) -> Result<CommandOutcome> {
        if !role.can(&command) {
            warn!(%role, command = command.name(), "command not permitted");
            return Err(Error::Forbidden {
                role,
                command: command.name(),
            });
        }

        match command {
            Command::SetListeningView { view_idx } => self.flags.set_listening(view_idx)?,
            Command::SetViewBackgroundListening { view_idx, listening } => {
                self.flags.set_background_listening(view_idx, listening)?
            }
            Command::SetViewBlurred { view_idx, blurred } => self.flags.set_blurred(view_idx, blurred)?,
            Command::RotateStream { url, rotation } => {
                if !rotation.is_finite() {
                    return Err(Error::InvalidInput(format!("rotation {} is not a number", rotation)));
                }
                self.overlay.update(
                    &url,
                    StreamData {
                        rotation: Some(rotation),
                        ..Default::default()
                    },
                );
            }
            Command::UpdateCustomStream { url, data } => {
                if url.is_empty() {
                    return Err(Error::InvalidInput("custom stream without url".into()));
                }
                self.custom.update(&url, data);
                self.persist_state();
            }
            Command::DeleteCustomStream { url } => {
                if self.custom.delete(&url) {
                    self.persist_state();
                } else {
                    debug!(%url, "no custom stream to delete");
                }
            }
            Command::ReloadView { view_idx } => {
                self.check_view(view_idx)?;
                self.surface.reload_view(view_idx);
            }
            Command::Browse { url } => {
                let url = validate_browse_url(&url)?;
                self.surface.browse(&url);
            }
            Command::DevTools { view_idx } => {
                self.check_view(view_idx)?;
                self.surface.open_dev_tools(view_idx);
            }
            Command::SetStreamCensored { is_censored } => match self.delay.as_mut() {
                Some(delay) => delay.set_censored(is_censored),
                None => debug!(is_censored, "no stream delay service configured"),
            },
            Command::SetStreamRunning { is_stream_running } => match self.delay.as_mut() {
                Some(delay) => delay.set_stream_running(is_stream_running),
                None => debug!(is_stream_running, "no stream delay service configured"),
            },
            Command::CreateInvite { role, name } => {
                let invite = self.tokens.create_invite(role, name)?;
                return Ok(CommandOutcome::InviteCreated(invite));
            }
            Command::DeleteToken { token_id } => {
                if !self.tokens.delete(&token_id) {
                    return Err(Error::InvalidInput(format!("unknown token {}", token_id)));
                }
            }
            Command::SetViewStream { view_idx, stream_id } => {
                self.views.set_slot(view_idx, stream_id)?;
                info!(view = view_idx, stream = ?stream_id, "view assigned");
            }
        }
        Ok(CommandOutcome::Applied)
    }

    fn check_view(&self, view: usize) -> Result<()> {
        let slots = self.views.slot_count();
        if view >= slots {
            return Err(Error::InvalidInput(format!("view {} out of range ({} views)", view, slots)));
        }
        Ok(())
    }
}

/// Only absolute http(s) URLs may be opened in a browsing window.
pub fn validate_browse_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).map_err(|e| Error::InvalidUrl(format!("{}: {}", raw, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(Error::InvalidUrl(format!("{}: scheme {} not allowed", raw, other))),
    }
}
