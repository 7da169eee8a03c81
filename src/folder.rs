// Local naming rules for the output tree: group folders, the course root
// and downloaded file names.

use regex::Regex;
use std::sync::OnceLock;

/// Folder used when neither a title nor a module number is available.
pub const FALLBACK_FOLDER: &str = "Other_Materials";

const ILLEGAL: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

fn module_prefix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)\.").expect("module prefix pattern"))
}

/// Pick the folder for a group of materials.
///
/// A non-blank parent title wins and is sanitized. Otherwise a file name
/// starting with `<n>.` (e.g. "1.3 Process and Threads.pdf") maps to
/// `Module <n>`, and anything else lands in [`FALLBACK_FOLDER`].
pub fn folder_name(parent_title: Option<&str>, file_name: Option<&str>) -> String {
    tracing::debug!(?parent_title, ?file_name, "choosing folder name");

    if let Some(title) = parent_title.map(str::trim).filter(|t| !t.is_empty()) {
        return sanitize_title(title);
    }

    if let Some(name) = file_name.map(str::trim).filter(|n| !n.is_empty()) {
        if let Some(number) = module_prefix().captures(name).and_then(|c| c.get(1)) {
            tracing::debug!(module = number.as_str(), "module number from file name");
            return format!("Module {}", number.as_str());
        }
    }

    tracing::debug!("no title or module number, using {}", FALLBACK_FOLDER);
    FALLBACK_FOLDER.to_string()
}

/// Replace characters that are illegal in file names, and whitespace, with `_`.
pub fn sanitize_title(title: &str) -> String {
    let out: String = title
        .trim()
        .chars()
        .map(|c| {
            if ILLEGAL.contains(&c) || c.is_whitespace() {
                '_'
            } else {
                c
            }
        })
        .collect();
    no_dot_names(out)
}

/// Root directory name for a course: spaces and path separators become `_`.
pub fn course_dir_name(name: &str) -> String {
    let out: String = name
        .chars()
        .map(|c| match c {
            ' ' | '/' | '\\' => '_',
            c => c,
        })
        .collect();
    no_dot_names(out)
}

/// File name as stored on disk. Keeps spaces but never a path separator,
/// so a remote title cannot point outside its group folder.
pub fn file_name_for_disk(name: &str) -> String {
    let out: String = name
        .chars()
        .map(|c| if ILLEGAL.contains(&c) || c.is_control() { '_' } else { c })
        .collect();
    no_dot_names(out)
}

// "." and ".." would resolve to the parent tree.
fn no_dot_names(name: String) -> String {
    if !name.is_empty() && name.chars().all(|c| c == '.') {
        "_".repeat(name.len())
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_is_sanitized() {
        assert_eq!(folder_name(Some("Week 1: Intro"), Some("")), "Week_1__Intro");
        assert_eq!(folder_name(Some("  a<b>c|d?e*f\"g  "), None), "a_b_c_d_e_f_g");
        assert_eq!(folder_name(Some("x/y\\z"), Some("9. ignored.pdf")), "x_y_z");
    }

    #[test]
    fn module_number_from_file_name() {
        assert_eq!(folder_name(Some(""), Some("3.2 Scheduling.pdf")), "Module 3");
        assert_eq!(folder_name(None, Some("  12. Memory.pptx")), "Module 12");
        assert_eq!(folder_name(Some("   "), Some("1.3 Process and Threads")), "Module 1");
    }

    #[test]
    fn falls_back_to_other_materials() {
        assert_eq!(folder_name(Some(""), Some("")), FALLBACK_FOLDER);
        assert_eq!(folder_name(None, None), "Other_Materials");
        assert_eq!(folder_name(None, Some("Syllabus.pdf")), "Other_Materials");
        assert_eq!(folder_name(None, Some("3 Scheduling.pdf")), "Other_Materials");
        assert_eq!(folder_name(None, Some("Chapter 3. Scheduling")), "Other_Materials");
    }

    #[test]
    fn course_root_name() {
        assert_eq!(course_dir_name("OS 2024/25 Section A"), "OS_2024_25_Section_A");
        assert_eq!(course_dir_name(".."), "__");
    }

    #[test]
    fn disk_file_name_keeps_spaces() {
        assert_eq!(file_name_for_disk("1.3 Process and Threads.pdf"), "1.3 Process and Threads.pdf");
        assert_eq!(file_name_for_disk("../../etc/passwd"), ".._.._etc_passwd");
        assert_eq!(file_name_for_disk("."), "_");
    }
}
