//! Per-view display flags and resolution of slot assignments into views.

use crate::error::{Error, Result};
use std::collections::BTreeSet;
use streamwall_crdt::ViewSlot;
use streamwall_protocols::{
    AudioState, PlaybackState, StreamWindowConfig, VideoState, ViewContent, ViewContext, ViewState, ViewStateValue,
};
use streamwall_streams::CanonicalStreamList;

/// Audio and blur flags for every view. Not replicated.
#[derive(Debug, Clone, Default)]
pub struct ViewFlags {
    slot_count: usize,
    listening: Option<usize>,
    background: BTreeSet<usize>,
    blurred: BTreeSet<usize>,
}

impl ViewFlags {
    pub fn new(slot_count: usize) -> Self {
        Self {
            slot_count,
            ..Default::default()
        }
    }

    /// Make `view` the only listening view; `None` silences all.
    pub fn set_listening(&mut self, view: Option<usize>) -> Result<()> {
        if let Some(idx) = view {
            self.check(idx)?;
        }
        self.listening = view;
        Ok(())
    }

    pub fn set_background_listening(&mut self, view: usize, listening: bool) -> Result<()> {
        self.check(view)?;
        if listening {
            self.background.insert(view);
        } else {
            self.background.remove(&view);
        }
        Ok(())
    }

    pub fn set_blurred(&mut self, view: usize, blurred: bool) -> Result<()> {
        self.check(view)?;
        if blurred {
            self.blurred.insert(view);
        } else {
            self.blurred.remove(&view);
        }
        Ok(())
    }

    pub fn listening(&self) -> Option<usize> {
        self.listening
    }

    pub fn playback(&self, view: usize) -> PlaybackState {
        let audio = if self.listening == Some(view) {
            AudioState::Listening
        } else if self.background.contains(&view) {
            AudioState::Background
        } else {
            AudioState::Muted
        };
        let video = if self.blurred.contains(&view) {
            VideoState::Blurred
        } else {
            VideoState::Normal
        };
        PlaybackState { video, audio }
    }

    fn check(&self, view: usize) -> Result<()> {
        if view >= self.slot_count {
            return Err(Error::InvalidInput(format!(
                "view {} out of range ({} views)",
                view, self.slot_count
            )));
        }
        Ok(())
    }
}

/// Build the displayed views from slot assignments.
///
/// A slot whose stream is not in `streams` resolves to an empty view.
pub fn resolve_views(
    slots: &[ViewSlot],
    streams: &CanonicalStreamList,
    config: &StreamWindowConfig,
    flags: &ViewFlags,
) -> Vec<ViewState> {
    slots
        .iter()
        .map(|slot| {
            let record = slot.stream_id.and_then(|id| streams.get_by_id(id));
            let state = match record {
                Some(_) => ViewStateValue::Running(flags.playback(slot.index)),
                None => ViewStateValue::Empty,
            };
            ViewState {
                state,
                context: ViewContext {
                    id: slot.index,
                    content: record.map(ViewContent::from),
                    info: None,
                    pos: config.slot_pos(slot.index),
                },
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use streamwall_streams::{ContentKind, StreamData, StreamId, StreamRecord};

    fn streams() -> CanonicalStreamList {
        CanonicalStreamList::from_records(vec![StreamRecord::new(
            StreamId(1),
            "json-url",
            StreamData::new("https://x/1"),
        )])
    }

    fn slots(assigned: &[(usize, u64)]) -> Vec<ViewSlot> {
        (0..9)
            .map(|index| ViewSlot {
                index,
                stream_id: assigned.iter().find(|(i, _)| *i == index).map(|(_, id)| StreamId(*id)),
            })
            .collect()
    }

    #[test]
    fn only_one_listening_view() {
        let mut flags = ViewFlags::new(9);
        flags.set_listening(Some(2)).unwrap();
        flags.set_listening(Some(4)).unwrap();

        assert_eq!(flags.playback(2).audio, AudioState::Muted);
        assert_eq!(flags.playback(4).audio, AudioState::Listening);

        flags.set_listening(None).unwrap();
        assert_eq!(flags.playback(4).audio, AudioState::Muted);
    }

    #[test]
    fn listening_wins_over_background() {
        let mut flags = ViewFlags::new(9);
        flags.set_background_listening(1, true).unwrap();
        assert_eq!(flags.playback(1).audio, AudioState::Background);

        flags.set_listening(Some(1)).unwrap();
        assert_eq!(flags.playback(1).audio, AudioState::Listening);
    }

    #[test]
    fn out_of_range_flags_rejected() {
        let mut flags = ViewFlags::new(9);
        assert!(flags.set_listening(Some(9)).is_err());
        assert!(flags.set_blurred(12, true).is_err());
        assert_eq!(flags.listening(), None);
    }

    #[test]
    fn resolves_assigned_and_dangling_slots() {
        let mut flags = ViewFlags::new(9);
        flags.set_blurred(0, true).unwrap();
        let views = resolve_views(&slots(&[(0, 1), (3, 99)]), &streams(), &StreamWindowConfig::default(), &flags);

        assert_eq!(views.len(), 9);
        assert_eq!(
            views[0].context.content,
            Some(ViewContent {
                url: "https://x/1".into(),
                kind: ContentKind::Video
            })
        );
        assert_eq!(views[0].state.playback().unwrap().video, VideoState::Blurred);
        assert_eq!(views[3].state, ViewStateValue::Empty);
        assert!(views[3].context.content.is_none());
        assert_eq!(views[8].context.pos.as_ref().unwrap().spaces, vec![8]);
    }
}
