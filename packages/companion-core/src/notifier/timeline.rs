//! Timeline document rendering.

use crate::player::{PlayState, PlayerState};
use crate::protocol_constants::LIBRARY_METADATA_PREFIX;
use crate::state::ClientInfo;
use crate::utils::{escape_attr, to_remote_time};

const TIMELINE_TYPES: [&str; 3] = ["music", "photo", "video"];
const CONTROLLABLE: &str = "playPause,stop,skipPrevious,skipNext,seekTo";

/// Renders the timeline document sent to subscribers and pollers.
///
/// Positions are reported in whole seconds so unchanged playback does not
/// produce a new document every loop iteration.
pub fn render_timeline(state: &PlayerState, client: &ClientInfo, command_id: Option<&str>) -> String {
    let active_type = state.media_type.timeline_type();
    let location = match (state.state, active_type) {
        (PlayState::Stopped, _) => "navigation",
        (_, "music") => "fullScreenMusic",
        _ => "fullScreenVideo",
    };

    let mut xml = String::from(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    xml.push_str("<MediaContainer");
    if let Some(id) = command_id {
        xml.push_str(&format!(r#" commandID="{}""#, escape_attr(id)));
    }
    xml.push_str(&format!(
        r#" machineIdentifier="{}" location="{}">"#,
        escape_attr(&client.machine_identifier),
        location
    ));

    for typus in TIMELINE_TYPES {
        if typus == active_type && state.state != PlayState::Stopped {
            xml.push_str(&active_timeline(state, typus));
        } else {
            xml.push_str(&format!(r#"<Timeline type="{}" state="stopped"/>"#, typus));
        }
    }
    xml.push_str("</MediaContainer>");
    xml
}

fn active_timeline(state: &PlayerState, typus: &str) -> String {
    let time = to_remote_time(std::time::Duration::from_secs(state.position.as_secs()));
    let mut line = format!(
        r#"<Timeline type="{}" state="{}" time="{}" duration="{}" controllable="{}""#,
        typus,
        state.state.as_str(),
        time,
        to_remote_time(state.duration),
        CONTROLLABLE
    );
    if let Some(media_id) = &state.remote_media_id {
        let media_id = escape_attr(media_id);
        line.push_str(&format!(
            r#" ratingKey="{}" key="{}/{}""#,
            media_id, LIBRARY_METADATA_PREFIX, media_id
        ));
    }
    if let Some(item_id) = &state.remote_queue_item_id {
        line.push_str(&format!(r#" playQueueItemID="{}""#, escape_attr(item_id)));
    }
    line.push_str("/>");
    line
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::playlist::PlaylistType;

    fn client() -> ClientInfo {
        ClientInfo {
            machine_identifier: "player-1".into(),
            ..Default::default()
        }
    }

    #[test]
    fn stopped_player_reports_navigation() {
        let xml = render_timeline(&PlayerState::stopped(PlaylistType::Music), &client(), None);
        assert!(xml.contains(r#"location="navigation""#));
        assert!(xml.contains(r#"<Timeline type="music" state="stopped"/>"#));
        assert!(!xml.contains("commandID"));
    }

    #[test]
    fn playing_music_reports_current_item() {
        let state = PlayerState {
            media_type: PlaylistType::Music,
            state: PlayState::Playing,
            position: Duration::from_millis(12_750),
            duration: Duration::ZERO,
            remote_media_id: Some("555".into()),
            remote_queue_item_id: Some("2".into()),
        };
        let xml = render_timeline(&state, &client(), Some("7"));

        assert!(xml.contains(r#"commandID="7""#));
        assert!(xml.contains(r#"location="fullScreenMusic""#));
        assert!(xml.contains(r#"state="playing" time="12000""#));
        assert!(xml.contains(r#"key="/library/metadata/555""#));
        assert!(xml.contains(r#"playQueueItemID="2""#));
        assert!(xml.contains(r#"<Timeline type="video" state="stopped"/>"#));
    }

    #[test]
    fn sub_second_progress_renders_identically() {
        let mut state = PlayerState::stopped(PlaylistType::Video);
        state.state = PlayState::Playing;
        state.position = Duration::from_millis(3_100);
        let first = render_timeline(&state, &client(), None);
        state.position = Duration::from_millis(3_900);
        assert_eq!(first, render_timeline(&state, &client(), None));
    }
}
