use uuid::Uuid;

/// Generate a correlation id carried through one workflow run (`workflow_id`
/// span field, §4.5) — a UUID without hyphens, the same shape the bridge
/// uses for its own request ids so the two correlate cleanly in a shared log
/// stream.
pub fn generate_correlation_id() -> String {
    Uuid::new_v4().as_simple().to_string()
}

/// Build the span every workflow body runs under, carrying the fields a
/// correlated multi-line log needs to be grep-able: which workflow kind,
/// which project, and the correlation id tying it to one invocation.
pub fn correlation_span(workflow: &str, project_identifier: &str, correlation_id: &str) -> tracing::Span {
    tracing::info_span!(
        "workflow",
        workflow = %workflow,
        project_identifier = %project_identifier,
        correlation_id = %correlation_id,
    )
}
