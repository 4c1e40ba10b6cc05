/// Marks where the viewer's email belongs in a cached page.
///
/// Renderers emit it by rendering the placeholder viewer's email, so the
/// token is exactly what a template produces for `{{ email }}`.
pub const EMAIL_PLACEHOLDER: &str = "{{ email }}";

/// Fill every placeholder in `page` with `viewer_email`.
///
/// The email is substituted verbatim, without HTML escaping. With no email the
/// page is returned unchanged.
pub fn personalize(page: &str, viewer_email: Option<&str>) -> String {
    match viewer_email {
        Some(email) => page.replace(EMAIL_PLACEHOLDER, email),
        None => page.to_string(),
    }
}

pub fn placeholder_count(page: &str) -> usize {
    page.matches(EMAIL_PLACEHOLDER).count()
}
