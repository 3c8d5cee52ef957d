use super::*;
use tempfile::TempDir;

#[test]
fn test_index_request_defaults() {
    let req: IndexRequest = serde_json::from_str(r#"{"path": "/test"}"#).unwrap();
    assert_eq!(req.path, "/test");
    assert!(req.include_patterns.is_empty());
    assert!(req.exclude_patterns.is_empty());
    assert!(!req.force);
    assert!(IndexRequest::new("/test").forced().force);
}

#[test]
fn test_index_request_validation() {
    let dir = TempDir::new().unwrap();
    assert!(IndexRequest::new(dir.path().to_string_lossy()).validate().is_ok());

    assert!(matches!(
        IndexRequest::new("  ").validate(),
        Err(ValidationError::Empty(_))
    ));
    assert!(matches!(
        IndexRequest::new("/definitely/not/here/semindex").validate(),
        Err(ValidationError::PathNotFound(_))
    ));

    let file = dir.path().join("file.txt");
    std::fs::write(&file, "x").unwrap();
    assert!(matches!(
        IndexRequest::new(file.to_string_lossy()).validate(),
        Err(ValidationError::NotADirectory(_))
    ));
}

#[test]
fn test_search_request_defaults() {
    let req: SearchRequest = serde_json::from_str(r#"{"query": "parse config"}"#).unwrap();
    assert_eq!(req.limit, 10);
    assert!((req.min_score - 0.3).abs() < f32::EPSILON);
    assert!(req.path.is_none());
    assert!(req.validate().is_ok());
}

#[test]
fn test_search_request_validation() {
    let mut req = SearchRequest::new("");
    assert!(matches!(req.validate(), Err(ValidationError::Empty(_))));

    req.query = "auth".to_string();
    req.limit = 0;
    assert!(matches!(
        req.validate(),
        Err(ValidationError::ConstraintViolation { .. })
    ));

    req.limit = 5;
    req.min_score = 1.5;
    assert!(matches!(
        req.validate(),
        Err(ValidationError::ConstraintViolation { .. })
    ));
}

#[test]
fn test_pass_report_noop() {
    let mut report = PassReport::new("/project", PassMode::Incremental);
    report.files_unchanged = 3;
    report.chunks_unchanged = 12;
    assert!(report.is_noop());
    assert!(!report.has_failures());

    report.chunks_embedded = 1;
    assert!(!report.is_noop());

    report.chunks_pending = 2;
    assert!(report.has_failures());
}

#[test]
fn test_pass_report_serialization() {
    let mut report = PassReport::new("/project", PassMode::Full);
    report.files_failed.push(FileFailure {
        path: "a.py".to_string(),
        error: "vector store unavailable".to_string(),
    });

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["mode"], "full");
    assert_eq!(json["files_failed"][0]["path"], "a.py");

    let back: PassReport = serde_json::from_value(json).unwrap();
    assert_eq!(back, report);
}
