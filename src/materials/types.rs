use serde::{Deserialize, Serialize};

// ── Materials ───────────────────────────────────────────────────────────────

/// A material record as returned by the list endpoint or the materials table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub storage_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub programme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_code: Option<String>,
}

impl Material {
    pub fn new(storage_path: &str, name: &str) -> Self {
        Self {
            storage_path: storage_path.to_string(),
            material_name: Some(name.to_string()),
            filename: None,
            size_bytes: None,
            programme: None,
            level: None,
            course_code: None,
        }
    }

    /// `material_name`, else `filename`, else empty.
    pub fn display_name(&self) -> &str {
        self.material_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .or(self.filename.as_deref())
            .unwrap_or("")
    }

    /// Name used for downloaded files.
    pub fn download_name(&self) -> &str {
        self.filename
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or("download")
    }
}

/// Filters shared by the list endpoint and the fallback table query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CourseFilter {
    pub programme: Option<String>,
    pub level: Option<String>,
    pub course_code: Option<String>,
}

impl CourseFilter {
    pub fn new(programme: &str, level: &str, course_code: &str) -> Self {
        fn non_empty(s: &str) -> Option<String> {
            (!s.is_empty()).then(|| s.to_string())
        }
        Self {
            programme: non_empty(programme),
            level: non_empty(level),
            course_code: non_empty(course_code),
        }
    }

    /// `(column, value)` pairs for the fields that are set.
    pub fn pairs(&self) -> Vec<(&'static str, &str)> {
        let mut out = Vec::new();
        if let Some(p) = &self.programme {
            out.push(("programme", p.as_str()));
        }
        if let Some(l) = &self.level {
            out.push(("level", l.as_str()));
        }
        if let Some(c) = &self.course_code {
            out.push(("course_code", c.as_str()));
        }
        out
    }

    /// Stable key used to detect an identical load already in flight.
    pub fn signature(&self) -> String {
        format!(
            "{}-{}-{}",
            self.programme.as_deref().unwrap_or("null"),
            self.level.as_deref().unwrap_or("null"),
            self.course_code.as_deref().unwrap_or("null"),
        )
    }
}

// ── Requests & replies ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadRequest {
    pub file_base64: String,
    pub filename: String,
    pub programme: String,
    pub level: String,
    pub course: String,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub storage_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedUrlRequest {
    pub storage_path: String,
}

/// `{success, message?}` reply used by upload and delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendReply {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

impl BackendReply {
    pub fn message_or_unknown(&self) -> String {
        self.message
            .clone()
            .unwrap_or_else(|| "Unknown error".to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedUrlReply {
    #[serde(default)]
    pub success: bool,
    #[serde(default, alias = "signedURL")]
    pub signed_url: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// A file picked for upload.
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl FileUpload {
    pub fn new(filename: &str, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.to_string(),
            bytes,
        }
    }
}

// ── Courses ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub code: String,
    pub title: String,
}

/// Either naming scheme the courses endpoint is known to return.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawCourse {
    #[serde(default, alias = "course_code")]
    pub code: Option<String>,
    #[serde(default, alias = "course_title")]
    pub title: Option<String>,
}
