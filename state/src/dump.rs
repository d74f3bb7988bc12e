//! Human-readable dump of captured save data (feature-gated).
//!
//! Renders a [`SaveData`] tree as pretty-printed RON, for inspecting
//! what a save actually holds when debugging schema drift. Diagnostic
//! only; the byte format that round-trips lives in [`crate::archive`].

use crate::data::SaveData;

/// Render the whole save tree as pretty-printed RON.
pub fn to_ron_string(data: &SaveData) -> Result<String, ron::Error> {
    ron::ser::to_string_pretty(data, ron::ser::PrettyConfig::default())
}
