use std::path::Path;

use tracing::info;

use crate::domain::course::Course;

use super::error::InfraError;

/// Parse a course outline from TOML text and validate it.
pub fn parse_course(path: &str, text: &str) -> Result<Course, InfraError> {
    let course: Course =
        toml::from_str(text).map_err(|err| InfraError::course_file(path, err.to_string()))?;
    course
        .validated()
        .map_err(|err| InfraError::course_file(path, err.to_string()))
}

/// Read and validate the course outline at `path`.
pub async fn load_course_file(path: &Path) -> Result<Course, InfraError> {
    let shown = path.display().to_string();
    let text = tokio::fs::read_to_string(path).await?;
    let course = parse_course(&shown, &text)?;
    info!(
        target = "coursepages::course_file",
        path = %shown,
        units = course.units.len(),
        lessons = course.lessons.len(),
        "course outline loaded"
    );
    Ok(course)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::domain::course::UnitKind;

    const OUTLINE: &str = r#"
title = "Power Searching"

[[units]]
id = 2
kind = "assessment"
unit_id = "Pre"
title = "Pre-course assessment"
now_available = true

[[units]]
id = 1
kind = "unit"
unit_id = "1"
title = "Introduction"
release_date = "2012-07-10"
now_available = true

[[lessons]]
unit_id = 1
id = 1
title = "Welcome"
activity = "yes"
activity_title = "Warm up"
"#;

    #[test]
    fn parses_and_sorts_outline() {
        let course = parse_course("inline", OUTLINE).expect("valid outline");
        assert_eq!(course.units[0].kind, UnitKind::Unit);
        assert_eq!(course.assessment("Pre").map(|unit| unit.id), Some(2));
        assert!(course.lesson(1, 1).is_some_and(|lesson| lesson.has_activity()));
    }

    #[test]
    fn invalid_outline_names_the_file() {
        let err = parse_course("broken.toml", "title = \"\"").expect_err("empty title");
        assert!(err.to_string().contains("broken.toml"));
    }

    #[tokio::test]
    async fn loads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(OUTLINE.as_bytes()).expect("write outline");
        let course = load_course_file(file.path()).await.expect("load");
        assert_eq!(course.title, "Power Searching");
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let err = load_course_file(Path::new("/nonexistent/course.toml"))
            .await
            .expect_err("missing");
        assert!(matches!(err, InfraError::Io(_)));
    }
}
