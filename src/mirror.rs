// Course mirroring: resolve the course from its link, create the output
// root, then walk announcements and coursework materials and download
// every attached Drive file into its group folder.

use crate::api::{ClassroomService, FileSource};
use crate::download::{download_file, ensure_dir, DownloadOutcome};
use crate::error::{Error, Result};
use crate::folder::{course_dir_name, folder_name};
use crate::link::extract_course_id;
use crate::model::{first_file_name, Course, DriveFile, Material};
use crate::ui;
use std::path::{Path, PathBuf};

/// What a run did, for the final summary.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MirrorReport {
    pub root: PathBuf,
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl MirrorReport {
    fn record(&mut self, outcome: DownloadOutcome) {
        match outcome {
            DownloadOutcome::Downloaded(_) => self.downloaded += 1,
            DownloadOutcome::Skipped(_) => self.skipped += 1,
            DownloadOutcome::Failed => self.failed += 1,
        }
    }
}

pub struct Mirror<'a> {
    classroom: &'a dyn ClassroomService,
    files: &'a dyn FileSource,
    base_dir: PathBuf,
}

impl<'a> Mirror<'a> {
    pub fn new(
        classroom: &'a dyn ClassroomService,
        files: &'a dyn FileSource,
        base_dir: impl Into<PathBuf>,
    ) -> Self {
        Mirror {
            classroom,
            files,
            base_dir: base_dir.into(),
        }
    }

    /// Mirror the course behind `link` into the base directory.
    ///
    /// Link and course errors end the run before anything is written.
    /// Per-group directory errors and per-file failures are logged and
    /// counted; the run carries on with the next item.
    pub fn run(&self, link: &str) -> Result<MirrorReport> {
        let course = self.resolve_course(link)?;
        let root = self.prepare_root(&course)?;
        let mut report = MirrorReport {
            root: root.clone(),
            ..MirrorReport::default()
        };

        self.mirror_announcements(&course.id, &root, &mut report)?;
        self.mirror_course_work_materials(&course.id, &root, &mut report)?;

        tracing::info!(
            downloaded = report.downloaded,
            skipped = report.skipped,
            failed = report.failed,
            "course mirrored"
        );
        Ok(report)
    }

    pub fn resolve_course(&self, link: &str) -> Result<Course> {
        let course_id = extract_course_id(link)?;
        ui::info(&format!("Using Course ID: {}", course_id));

        let spinner = ui::spinner("Fetching course...");
        let fetched = self.classroom.course(&course_id);
        spinner.finish_and_clear();
        let course = fetched.map_err(|e| Error::CourseFetch {
            id: course_id.clone(),
            source: Box::new(e),
        })?;
        ui::info(&format!("Course found: {}", course.name));
        Ok(course)
    }

    pub fn prepare_root(&self, course: &Course) -> Result<PathBuf> {
        let mut name = course_dir_name(course.name.trim());
        if name.is_empty() {
            name = format!("course_{}", course.id);
        }
        let root = self.base_dir.join(name);
        ensure_dir(&root)?;
        Ok(root)
    }

    /// Each announcement gets one folder, named after its title or, when
    /// untitled, after its first attachment.
    pub fn mirror_announcements(
        &self,
        course_id: &str,
        root: &Path,
        report: &mut MirrorReport,
    ) -> Result<()> {
        let spinner = ui::spinner("Fetching announcements...");
        let listed = self.classroom.announcements(course_id);
        spinner.finish_and_clear();
        let announcements = listed?;
        tracing::debug!(count = announcements.len(), "announcements listed");

        for announcement in announcements.iter().filter(|a| !a.materials.is_empty()) {
            let first = first_file_name(&announcement.materials);
            let folder = root.join(folder_name(announcement.title.as_deref(), Some(first.as_str())));
            if let Err(e) = ensure_dir(&folder) {
                tracing::warn!("skipping announcement {}: {}", announcement.id, e);
                continue;
            }
            for file in drive_files(&announcement.materials) {
                report.record(download_file(self.files, file, &folder));
            }
        }
        Ok(())
    }

    /// Like announcements, except that an untitled item picks a folder per
    /// file, so attachments "1.x" and "2.x" of one post land in "Module 1"
    /// and "Module 2". Announcements keep all files in one folder.
    pub fn mirror_course_work_materials(
        &self,
        course_id: &str,
        root: &Path,
        report: &mut MirrorReport,
    ) -> Result<()> {
        let spinner = ui::spinner("Fetching coursework materials...");
        let listed = self.classroom.course_work_materials(course_id);
        spinner.finish_and_clear();
        let materials = listed?;
        tracing::debug!(count = materials.len(), "coursework materials listed");

        for item in materials.iter().filter(|m| !m.materials.is_empty()) {
            let title = item.title.as_deref().unwrap_or("");
            let first = first_file_name(&item.materials);
            let group = root.join(folder_name(Some(title), Some(first.as_str())));
            if let Err(e) = ensure_dir(&group) {
                tracing::warn!("skipping coursework material {}: {}", item.id, e);
                continue;
            }
            for file in drive_files(&item.materials) {
                let folder = if title.trim().is_empty() {
                    root.join(folder_name(None, Some(file.file_name().as_str())))
                } else {
                    root.join(folder_name(Some(title), None))
                };
                report.record(download_file(self.files, file, &folder));
            }
        }
        Ok(())
    }
}

fn drive_files(materials: &[Material]) -> impl Iterator<Item = &DriveFile> {
    materials.iter().filter_map(Material::file)
}
