//! VCS kinds, per-kind shell commands and inspection results.

use std::fmt;

use serde::Serialize;

/// Version-control system found in a working directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VcsKind {
    #[serde(rename = "GIT")]
    Git,
    #[serde(rename = "SVN")]
    Subversion,
}

impl VcsKind {
    /// Value written to the `vcs_system` field of the output document.
    pub fn as_str(&self) -> &'static str {
        match self {
            VcsKind::Git => "GIT",
            VcsKind::Subversion => "SVN",
        }
    }
}

impl fmt::Display for VcsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detection state of a session.
///
/// Starts `Undetermined` and moves to `Detected` at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VcsState {
    #[default]
    Undetermined,
    Detected(VcsKind),
}

impl VcsState {
    pub fn kind(&self) -> Option<VcsKind> {
        match self {
            VcsState::Undetermined => None,
            VcsState::Detected(kind) => Some(*kind),
        }
    }
}

/// Shell commands that read the branch and revision for one VCS kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VcsCommands {
    pub branch: &'static str,
    pub revision: &'static str,
}

const GIT_COMMANDS: VcsCommands = VcsCommands {
    branch: r"git branch | awk '/^\*/ {print $2}'",
    revision: "git log -1 --pretty=oneline | awk '{print $1}'",
};

const SVN_COMMANDS: VcsCommands = VcsCommands {
    branch: r#"svn info --show-item relative-url | awk -F "/" '{print $(NF)}'"#,
    revision: "svn info --show-item revision",
};

impl VcsCommands {
    pub fn for_kind(kind: VcsKind) -> Self {
        match kind {
            VcsKind::Git => GIT_COMMANDS,
            VcsKind::Subversion => SVN_COMMANDS,
        }
    }
}

/// Branch and revision read from one host.
///
/// Serializes to the fields it contributes to a host entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VcsResult {
    #[serde(rename = "vcs_system")]
    pub kind: VcsKind,
    #[serde(rename = "current_branch")]
    pub branch: String,
    #[serde(rename = "current_revision")]
    pub revision: String,
}

fn is_shell_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || "_-./+,:@%=".contains(c)
}

/// Render a remote directory for the shell.
///
/// A leading `~` or `~/` stays unquoted so the remote shell expands it; the
/// rest is single-quoted unless it only holds plain path characters.
pub fn quote_path(path: &str) -> String {
    let (home, rest) = if path == "~" {
        ("~", "")
    } else if let Some(rest) = path.strip_prefix("~/") {
        ("~/", rest)
    } else {
        ("", path)
    };

    if rest.chars().all(is_shell_safe) && !(home.is_empty() && rest.is_empty()) {
        format!("{}{}", home, rest)
    } else {
        format!("{}'{}'", home, rest.replace('\'', r"'\''"))
    }
}

/// Prefix `command` so it runs inside `work_dir`.
pub fn in_work_dir(work_dir: &str, command: &str) -> String {
    format!("cd {} && {}", quote_path(work_dir), command)
}

/// Drop every newline from captured output.
///
/// Single-line outputs lose their trailing newline; a multi-line output
/// is joined, the same way the values were always recorded.
pub fn strip_newlines(output: &str) -> String {
    output.replace(['\r', '\n'], "")
}

#[cfg(test)]
mod tests {
    use super::*;

    mod kind {
        use super::*;

        #[test]
        fn test_git_serializes_as_git() {
            assert_eq!(serde_json::to_string(&VcsKind::Git).unwrap(), "\"GIT\"");
        }

        #[test]
        fn test_subversion_serializes_as_svn() {
            assert_eq!(
                serde_json::to_string(&VcsKind::Subversion).unwrap(),
                "\"SVN\""
            );
        }

        #[test]
        fn test_result_serializes_to_document_fields() {
            let result = VcsResult {
                kind: VcsKind::Subversion,
                branch: "trunk".into(),
                revision: "1024".into(),
            };
            assert_eq!(
                serde_json::to_value(&result).unwrap(),
                serde_json::json!({
                    "vcs_system": "SVN",
                    "current_branch": "trunk",
                    "current_revision": "1024"
                })
            );
        }

        #[test]
        fn test_display_matches_document_value() {
            assert_eq!(VcsKind::Git.to_string(), "GIT");
            assert_eq!(VcsKind::Subversion.to_string(), "SVN");
        }
    }

    mod state {
        use super::*;

        #[test]
        fn test_default_is_undetermined() {
            assert_eq!(VcsState::default(), VcsState::Undetermined);
            assert_eq!(VcsState::default().kind(), None);
        }

        #[test]
        fn test_detected_exposes_kind() {
            assert_eq!(
                VcsState::Detected(VcsKind::Git).kind(),
                Some(VcsKind::Git)
            );
        }
    }

    mod commands {
        use super::*;

        #[test]
        fn test_git_commands_use_git() {
            let cmds = VcsCommands::for_kind(VcsKind::Git);
            assert!(cmds.branch.starts_with("git branch"));
            assert!(cmds.branch.contains(r"/^\*/"));
            assert!(cmds.revision.starts_with("git log -1"));
        }

        #[test]
        fn test_svn_commands_use_svn_info() {
            let cmds = VcsCommands::for_kind(VcsKind::Subversion);
            assert!(cmds.branch.contains("--show-item relative-url"));
            assert_eq!(cmds.revision, "svn info --show-item revision");
        }

        #[test]
        fn test_in_work_dir_prefixes_cd() {
            assert_eq!(
                in_work_dir("~/bw/", "svn info --show-item revision"),
                "cd ~/bw/ && svn info --show-item revision"
            );
        }
    }

    mod quoting {
        use super::*;

        #[test]
        fn test_plain_paths_stay_unquoted() {
            assert_eq!(quote_path("~/bw/"), "~/bw/");
            assert_eq!(quote_path("/srv/checkout"), "/srv/checkout");
            assert_eq!(quote_path("~"), "~");
        }

        #[test]
        fn test_spaces_are_quoted_after_home() {
            assert_eq!(quote_path("~/my work/"), "~/'my work/'");
        }

        #[test]
        fn test_metacharacters_cannot_escape() {
            assert_eq!(
                in_work_dir("/tmp/x; rm -rf ~", "svn info --show-item revision"),
                "cd '/tmp/x; rm -rf ~' && svn info --show-item revision"
            );
        }

        #[test]
        fn test_single_quote_is_escaped() {
            assert_eq!(quote_path("/srv/it's"), r"'/srv/it'\''s'");
        }

        #[test]
        fn test_tilde_user_form_is_quoted() {
            assert_eq!(quote_path("~root/bw"), "'~root/bw'");
        }
    }

    mod newline_stripping {
        use super::*;

        #[test]
        fn test_strips_trailing_newline() {
            assert_eq!(strip_newlines("main\n"), "main");
        }

        #[test]
        fn test_strips_crlf() {
            assert_eq!(strip_newlines("1234\r\n"), "1234");
        }

        #[test]
        fn test_empty_stays_empty() {
            assert_eq!(strip_newlines(""), "");
        }
    }
}
