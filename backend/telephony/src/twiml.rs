//! TwiML documents bridging a provider session onto a call leg.

use callbridge_core::SessionRef;

/// TwiML for one session: live join URLs stream into the conversation,
/// parked audio is played back.
pub fn bridge_twiml(session: &SessionRef) -> String {
    match session {
        SessionRef::Join { join_url, .. } => format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <Response>\n\
             \x20   <Connect>\n\
             \x20       <Stream url=\"{}\" />\n\
             \x20   </Connect>\n\
             </Response>",
            escape_xml(join_url)
        ),
        SessionRef::Audio { playback_url, .. } => format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <Response>\n\
             \x20   <Play>{}</Play>\n\
             </Response>",
            escape_xml(playback_url)
        ),
    }
}

fn escape_xml(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
