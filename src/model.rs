// Response shapes of the Classroom v1 REST API. Only the fields the
// mirror needs are declared; serde ignores the rest.

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub section: Option<String>,
}

/// A stream post. The REST resource has no title of its own; `title` is
/// kept optional so a group name can still come from it when present.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub materials: Vec<Material>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CourseWorkMaterial {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub materials: Vec<Material>,
}

/// One attachment. Links, videos and forms deserialize with `drive_file: None`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Material {
    #[serde(default)]
    pub drive_file: Option<SharedDriveFile>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SharedDriveFile {
    pub drive_file: DriveFile,
    #[serde(default)]
    pub share_mode: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub alternate_link: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AnnouncementPage {
    #[serde(default)]
    pub announcements: Vec<Announcement>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CourseWorkMaterialPage {
    #[serde(default)]
    pub course_work_material: Vec<CourseWorkMaterial>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

impl Material {
    pub fn file(&self) -> Option<&DriveFile> {
        self.drive_file.as_ref().map(|shared| &shared.drive_file)
    }
}

impl DriveFile {
    pub fn new(id: impl Into<String>, title: Option<&str>) -> Self {
        DriveFile {
            id: id.into(),
            title: title.map(str::to_string),
            alternate_link: None,
        }
    }

    /// Remote title, or `file_<id>` for untitled files. A blank title
    /// counts as untitled.
    pub fn file_name(&self) -> String {
        match self.title.as_deref().filter(|t| !t.trim().is_empty()) {
            Some(title) => title.to_string(),
            None => format!("file_{}", self.id),
        }
    }
}

impl From<DriveFile> for Material {
    fn from(file: DriveFile) -> Self {
        Material {
            drive_file: Some(SharedDriveFile {
                drive_file: file,
                share_mode: None,
            }),
        }
    }
}

/// Name of the first attachment when it is a drive file, else empty.
pub(crate) fn first_file_name(materials: &[Material]) -> String {
    materials
        .first()
        .and_then(Material::file)
        .map(DriveFile::file_name)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_announcement_page() {
        let json = r#"{
            "announcements": [{
                "courseId": "1", "id": "a1", "text": "Slides for week 1",
                "materials": [
                    {"driveFile": {"driveFile": {"id": "f1", "title": "1.1 Intro.pdf",
                        "alternateLink": "https://drive.google.com/open?id=f1"}, "shareMode": "VIEW"}},
                    {"link": {"url": "https://example.com"}}
                ]
            }],
            "nextPageToken": "p2"
        }"#;
        let page: AnnouncementPage = serde_json::from_str(json).unwrap();
        assert_eq!(page.next_page_token.as_deref(), Some("p2"));
        let a = &page.announcements[0];
        assert_eq!(a.title, None);
        assert_eq!(a.materials.len(), 2);
        assert_eq!(a.materials[0].file().unwrap().id, "f1");
        assert!(a.materials[1].file().is_none());
        assert_eq!(first_file_name(&a.materials), "1.1 Intro.pdf");
    }

    #[test]
    fn empty_material_page() {
        let page: CourseWorkMaterialPage = serde_json::from_str("{}").unwrap();
        assert!(page.course_work_material.is_empty());
        assert!(page.next_page_token.is_none());
    }

    #[test]
    fn untitled_file_uses_id() {
        assert_eq!(DriveFile::new("abc", None).file_name(), "file_abc");
        assert_eq!(DriveFile::new("id42", Some("")).file_name(), "file_id42");
        assert_eq!(DriveFile::new("id42", Some("  ")).file_name(), "file_id42");
        let link_first = vec![Material::default(), DriveFile::new("x", Some("x.pdf")).into()];
        assert_eq!(first_file_name(&link_first), "");
    }
}
