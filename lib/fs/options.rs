//! `mount -o` style option parsing.

use fuser::MountOption;
use thiserror::Error;

use super::MountKind;

/// Option consumed by the filesystem itself rather than forwarded to FUSE.
const DISPLAY_FOLDER: &str = "display_folder";

/// Failure to parse a mount option.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FuseOptionError {
    /// The option is not `key` or `key=value` with a word-like key.
    #[error("unrecognized option {0:?}")]
    Malformed(String),

    /// A boolean option got something other than `true` or `false`.
    #[error("option {key} expects true or false, got {value:?}")]
    NotABool {
        /// Option name.
        key: String,
        /// Offending value.
        value: String,
    },
}

/// Parsed mount options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountOptions {
    /// Options forwarded to FUSE.
    pub fuse: Vec<MountOption>,
    /// `display_folder` override, if given.
    pub display_folder: Option<bool>,
}

/// Parses option strings for a `kind` mount.
///
/// Each string may hold several comma-separated options. `defaults` expands to
/// [`MountKind::default_options`]; an empty input yields the defaults too.
pub fn parse_fuse_options<S: AsRef<str>>(
    raw: &[S],
    kind: MountKind,
) -> Result<MountOptions, FuseOptionError> {
    let mut words: Vec<&str> = raw
        .iter()
        .flat_map(|s| s.as_ref().split(','))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if words.is_empty() {
        words.push("defaults");
    }

    let mut parsed = MountOptions {
        fuse: Vec::new(),
        display_folder: None,
    };
    for word in words {
        if word == "defaults" {
            for default in kind.default_options() {
                push_option(&mut parsed, default)?;
            }
        } else {
            push_option(&mut parsed, word)?;
        }
    }
    Ok(parsed)
}

fn push_option(parsed: &mut MountOptions, word: &str) -> Result<(), FuseOptionError> {
    let (key, value) = match word.split_once('=') {
        Some((key, value)) => (key, Some(value)),
        None => (word, None),
    };
    let is_word = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !is_word(key) {
        return Err(FuseOptionError::Malformed(word.to_owned()));
    }

    if key == DISPLAY_FOLDER {
        parsed.display_folder = Some(match value {
            None | Some("true") => true,
            Some("false") => false,
            Some(other) => {
                return Err(FuseOptionError::NotABool {
                    key: key.to_owned(),
                    value: other.to_owned(),
                });
            }
        });
        return Ok(());
    }

    let option = match (key, value) {
        ("auto_unmount", None) => MountOption::AutoUnmount,
        ("allow_other", None) => MountOption::AllowOther,
        ("allow_root", None) => MountOption::AllowRoot,
        ("default_permissions", None) => MountOption::DefaultPermissions,
        ("ro", None) => MountOption::RO,
        ("rw", None) => MountOption::RW,
        ("dev", None) => MountOption::Dev,
        ("nodev", None) => MountOption::NoDev,
        ("suid", None) => MountOption::Suid,
        ("nosuid", None) => MountOption::NoSuid,
        ("exec", None) => MountOption::Exec,
        ("noexec", None) => MountOption::NoExec,
        ("atime", None) => MountOption::Atime,
        ("noatime", None) => MountOption::NoAtime,
        ("sync", None) => MountOption::Sync,
        ("async", None) => MountOption::Async,
        ("dirsync", None) => MountOption::DirSync,
        ("fsname", Some(name)) => MountOption::FSName(name.to_owned()),
        ("subtype", Some(name)) => MountOption::Subtype(name.to_owned()),
        _ => MountOption::CUSTOM(word.to_owned()),
    };
    if !parsed.fuse.contains(&option) {
        parsed.fuse.push(option);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_uses_kind_defaults() {
        let parsed = parse_fuse_options::<&str>(&[], MountKind::Ipfs).unwrap();
        assert_eq!(
            parsed.fuse,
            vec![
                MountOption::CUSTOM("auto_cache".to_owned()),
                MountOption::AutoUnmount
            ]
        );
        assert_eq!(parsed.display_folder, None);
    }

    #[test]
    fn defaults_expand_in_place() {
        let parsed = parse_fuse_options(&["allow_other,defaults"], MountKind::Mfs).unwrap();
        assert_eq!(
            parsed.fuse,
            vec![
                MountOption::AllowOther,
                MountOption::AutoUnmount,
                MountOption::CUSTOM("big_writes".to_owned()),
            ]
        );
    }

    #[test]
    fn display_folder_is_consumed() {
        let parsed = parse_fuse_options(&["ro", "display_folder=false"], MountKind::Mfs).unwrap();
        assert_eq!(parsed.fuse, vec![MountOption::RO]);
        assert_eq!(parsed.display_folder, Some(false));
    }

    #[test]
    fn key_value_options() {
        let parsed =
            parse_fuse_options(&["fsname=ipfs,max_read=131072"], MountKind::Ipfs).unwrap();
        assert_eq!(
            parsed.fuse,
            vec![
                MountOption::FSName("ipfs".to_owned()),
                MountOption::CUSTOM("max_read=131072".to_owned()),
            ]
        );
    }

    #[test]
    fn malformed_options_are_rejected() {
        assert_eq!(
            parse_fuse_options(&["=x"], MountKind::Ipfs),
            Err(FuseOptionError::Malformed("=x".to_owned()))
        );
        assert!(matches!(
            parse_fuse_options(&["display_folder=maybe"], MountKind::Ipfs),
            Err(FuseOptionError::NotABool { .. })
        ));
    }
}
