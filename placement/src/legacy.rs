use spatial_protocol::RuiLocation;
use spatial_protocol::Sex;

const LEGACY_BASE: &str = "http://purl.org/ccf/latest/ccf.owl#";

/// Deprecated unisex body-part targets and the suffix their sex-qualified
/// replacement carries.
const LEGACY_TARGETS: [(&str, &str); 3] = [
    ("VHSpleenCC", ""),
    ("VHLeftKidney", "_Patch"),
    ("VHRightKidney", "_Patch"),
];

/// Rewrite a deprecated target to its sex-qualified form, e.g.
/// `#VHLeftKidney` for a male donor becomes `#VHMLeftKidney_Patch`.
///
/// Returns `None` when the target is not deprecated or the donor's sex is
/// unknown.
pub fn correct_target(target: &str, sex: Sex) -> Option<String> {
    let qualifier = match sex {
        Sex::Male => 'M',
        Sex::Female => 'F',
        Sex::Unknown => return None,
    };
    let code = target.strip_prefix(LEGACY_BASE)?;
    let (_, suffix) = LEGACY_TARGETS
        .iter()
        .find(|(prefix, _)| code.starts_with(prefix))?;
    let rest = code.strip_prefix("VH")?;
    let mut corrected = format!("{LEGACY_BASE}VH{qualifier}{rest}");
    if !corrected.ends_with(suffix) {
        corrected.push_str(suffix);
    }
    Some(corrected)
}

/// Copy of `location` with its placement target corrected, if needed.
pub fn correct_location(location: &RuiLocation, sex: Sex) -> RuiLocation {
    let mut location = location.clone();
    if let Some(target) = correct_target(&location.placement.target, sex) {
        tracing::debug!(
            "rewriting legacy placement target {} -> {target}",
            location.placement.target
        );
        location.placement.target = target;
    }
    location
}
