//! Safety policy for machine-generated command strings.
//!
//! Every command produced by the external translator is hostile input until
//! it passes [`CommandPolicy::validate`]. This is the last gate before the
//! string becomes a spawned process, so it is pure (no I/O, no side
//! effects) and every rejection carries a reason fit to show the user and
//! to feed back to the translator.

use std::sync::OnceLock;

use regex::Regex;

/// Programs a generated command must never name, even as an argument.
const FORBIDDEN_PROGRAMS: &[&str] = &[
    "rm", "mv", "dd", "mkfs", "shred", "sudo", "su", "chmod", "chown",
    "shutdown", "reboot", "curl", "wget",
];

fn input_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"input(_[0-9]+)?\.[a-zA-Z0-9]+").unwrap())
}

fn output_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"output\.[a-zA-Z0-9]+").unwrap())
}

/// Validation policy for generated commands.
///
/// The structural rules (tool prefix, exactly one input reference, exactly
/// one bare `output.<ext>` reference) always apply; the hardening rules are
/// individually configurable but enabled by default.
#[derive(Debug, Clone)]
pub struct CommandPolicy {
    /// The required leading invocation token.
    pub tool_name: String,
    /// Reject shell metacharacters that could enable chaining/substitution.
    pub reject_metacharacters: bool,
    /// Reject absolute paths and `..` path-traversal segments anywhere in
    /// the command.
    pub reject_path_escapes: bool,
    /// Reject tokens naming administrative/destructive system programs.
    pub reject_system_programs: bool,
}

impl Default for CommandPolicy {
    fn default() -> Self {
        Self {
            tool_name: "ffmpeg".into(),
            reject_metacharacters: true,
            reject_path_escapes: true,
            reject_system_programs: true,
        }
    }
}

impl CommandPolicy {
    /// Validate a generated command string against the policy.
    ///
    /// # Errors
    ///
    /// Returns [`fm_core::Error::Validation`] with a human-readable reason
    /// on the first rule that fails. Callers must not execute a command
    /// that failed validation.
    pub fn validate(&self, command: &str) -> fm_core::Result<()> {
        let trimmed = command.trim_start();

        // Rule: single line. Everything after a newline would be invisible
        // to the remaining checks.
        if command.contains('\n') || command.contains('\r') {
            return Err(reject("Command must be a single line."));
        }

        // Rule 1: fixed invocation token.
        let first = trimmed.split_whitespace().next().unwrap_or("");
        if first != self.tool_name {
            return Err(reject(format!(
                "Command must start with {}.",
                self.tool_name
            )));
        }

        // Rule 2: exactly one distinct input token.
        let mut inputs: Vec<&str> = standalone_matches(trimmed, input_token_re());
        inputs.sort_unstable();
        inputs.dedup();
        match inputs.len() {
            0 => {
                return Err(reject(
                    "Command must reference the project input as input.<ext> or input_<N>.<ext>.",
                ))
            }
            1 => {}
            _ => {
                return Err(reject(format!(
                    "Command references multiple input files ({}); exactly one is allowed.",
                    inputs.join(", ")
                )))
            }
        }

        // Rule 3: exactly one output.<ext> reference.
        let outputs = standalone_matches(trimmed, output_token_re());
        match outputs.len() {
            0 => return Err(reject("Output file must be named output.<ext>.")),
            1 => {}
            _ => {
                return Err(reject(
                    "Command references output.<ext> more than once; a single output is allowed.",
                ))
            }
        }
        let output_token = outputs[0];

        // Hardening: metacharacters first, so a chaining attempt is named
        // as such rather than tripping a later structural rule.
        if self.reject_metacharacters {
            if let Some(c) = trimmed.chars().find(|c| matches!(c, ';' | '&' | '|' | '`' | '$' | '<' | '>')) {
                return Err(reject(format!(
                    "Command contains forbidden shell character '{c}'."
                )));
            }
        }

        // Rule 4: the output must be a bare filename in the working
        // directory. Any token containing the output reference must be
        // exactly that reference: no directories, no schemes, no prefixes.
        let tokens = shell_words::split(trimmed)
            .map_err(|e| reject(format!("Command quoting is malformed: {e}")))?;
        for token in &tokens {
            if token.contains(output_token) && token != output_token {
                return Err(reject(
                    "Output file must not carry any path or directory.",
                ));
            }
        }

        if self.reject_path_escapes {
            for token in &tokens {
                if token.contains("..") {
                    return Err(reject(
                        "Command must not contain parent-directory ('..') segments.",
                    ));
                }
                if is_absolute_like(token) {
                    return Err(reject(format!(
                        "Command must not reference absolute paths ('{token}')."
                    )));
                }
            }
        }

        if self.reject_system_programs {
            for token in &tokens {
                if FORBIDDEN_PROGRAMS.contains(&token.as_str()) {
                    return Err(reject(format!(
                        "Command must not name the system program '{token}'."
                    )));
                }
            }
        }

        Ok(())
    }
}

/// The single `output.<ext>` reference of a validated command.
///
/// Only meaningful for commands that already passed
/// [`CommandPolicy::validate`]; on arbitrary strings it returns the first
/// standalone output reference, if any.
pub fn output_token(command: &str) -> Option<String> {
    standalone_matches(command, output_token_re())
        .first()
        .map(|s| s.to_string())
}

fn reject(reason: impl Into<String>) -> fm_core::Error {
    fm_core::Error::Validation(reason.into())
}

/// All regex matches that are not embedded in a longer identifier
/// (so `myinput.mp4` does not count as an input reference).
fn standalone_matches<'a>(haystack: &'a str, re: &Regex) -> Vec<&'a str> {
    re.find_iter(haystack)
        .filter(|m| {
            let preceded_by_word = haystack[..m.start()]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');
            !preceded_by_word
        })
        .map(|m| m.as_str())
        .collect()
}

/// Absolute unix path, UNC/backslash path, or Windows drive path.
fn is_absolute_like(token: &str) -> bool {
    if token.starts_with('/') || token.starts_with('\\') {
        return true;
    }
    let bytes = token.as_bytes();
    bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes[2] == b'\\' || bytes[2] == b'/')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> CommandPolicy {
        CommandPolicy::default()
    }

    #[test]
    fn accepts_simple_command() {
        policy()
            .validate("ffmpeg -y -i input.mp4 -vf scale=640:480 output.mp4")
            .unwrap();
    }

    #[test]
    fn accepts_numbered_input() {
        policy()
            .validate("ffmpeg -y -i input_3.mov -c copy output.gif")
            .unwrap();
    }

    #[test]
    fn accepts_leading_whitespace() {
        policy()
            .validate("   ffmpeg -y -i input.mp4 output.mp4")
            .unwrap();
    }

    #[test]
    fn rejects_other_tool() {
        let err = policy().validate("ffprobe -i input.mp4 output.mp4").unwrap_err();
        assert!(err.to_string().contains("must start with ffmpeg"));
    }

    #[test]
    fn rejects_missing_input() {
        assert!(policy().validate("ffmpeg -y -i movie.mp4 output.mp4").is_err());
    }

    #[test]
    fn rejects_multiple_distinct_inputs() {
        let err = policy()
            .validate("ffmpeg -i input.mp4 -i input_1.mp4 output.mp4")
            .unwrap_err();
        assert!(err.to_string().contains("multiple input files"));
    }

    #[test]
    fn allows_repeated_reference_to_same_input() {
        // Filter graphs routinely repeat the input name.
        policy()
            .validate("ffmpeg -i input.mp4 -vf movie=input.mp4 output.mp4")
            .unwrap();
    }

    #[test]
    fn rejects_missing_output() {
        assert!(policy().validate("ffmpeg -y -i input.mp4 result.mp4").is_err());
    }

    #[test]
    fn rejects_double_output() {
        let err = policy()
            .validate("ffmpeg -i input.mp4 output.mp4 output.gif")
            .unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn rejects_output_in_subdirectory() {
        assert!(policy().validate("ffmpeg -i input.mp4 clips/output.mp4").is_err());
    }

    #[test]
    fn rejects_output_parent_traversal() {
        assert!(policy().validate("ffmpeg -i input.mp4 ../output.mp4").is_err());
    }

    #[test]
    fn rejects_embedded_tokens() {
        // myinput.mp4 / myoutput.mp4 are not recognizable references.
        assert!(policy().validate("ffmpeg -i myinput.mp4 myoutput.mp4").is_err());
    }

    #[test]
    fn rejects_shell_metacharacters() {
        let err = policy()
            .validate("ffmpeg -i input.mp4 output.mp4; rm -rf .")
            .unwrap_err();
        assert!(err.to_string().contains("forbidden shell character"));
    }

    #[test]
    fn rejects_multiline() {
        assert!(policy()
            .validate("ffmpeg -i input.mp4 output.mp4\nrm -rf .")
            .is_err());
    }

    #[test]
    fn rejects_absolute_paths() {
        let err = policy()
            .validate("ffmpeg -i input.mp4 -vf movie=/etc/passwd output.mp4")
            .unwrap_err();
        assert!(err.to_string().contains("absolute paths"));
    }

    #[test]
    fn rejects_system_programs() {
        let relaxed = CommandPolicy {
            reject_metacharacters: false,
            ..CommandPolicy::default()
        };
        let err = relaxed
            .validate("ffmpeg -i input.mp4 rm output.mp4")
            .unwrap_err();
        assert!(err.to_string().contains("'rm'"));
    }

    #[test]
    fn relaxed_policy_allows_metacharacters() {
        let relaxed = CommandPolicy {
            reject_metacharacters: false,
            reject_path_escapes: false,
            reject_system_programs: false,
            ..CommandPolicy::default()
        };
        relaxed
            .validate("ffmpeg -i input.mp4 -af volume=2 output.mp4")
            .unwrap();
    }

    #[test]
    fn output_token_extraction() {
        assert_eq!(
            output_token("ffmpeg -i input.mp4 output.gif").as_deref(),
            Some("output.gif")
        );
        assert_eq!(output_token("ffmpeg -i input.mp4 result.mp4"), None);
    }

    #[test]
    fn rejects_quoted_path_prefix_on_output() {
        assert!(policy()
            .validate(r#"ffmpeg -i input.mp4 "sub dir/output.mp4""#)
            .is_err());
    }
}
