use serde::{Deserialize, Serialize};

pub const COMMIT_TYPES: [&str; 7] = ["feat", "fix", "docs", "style", "refactor", "test", "chore"];

pub const MAX_SUBJECT_LEN: usize = 100;

/// Parsed components of a conventional commit message:
/// `type(scope)?: subject [#issue]`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitMessage {
    pub raw: String,
    pub commit_type: String,
    pub scope: Option<String>,
    pub subject: String,
    pub issue_ref: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CommitCheck {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub parsed: Option<CommitMessage>,
}

/// Validate the first line of a commit message against the conventional
/// grammar. Errors are structured and specific so they can be surfaced
/// verbatim to the operator.
pub fn validate(message: &str) -> CommitCheck {
    let first_line = message.lines().next().unwrap_or("").trim();
    let mut errors = Vec::new();

    let Some((header, rest)) = first_line.split_once(':') else {
        errors.push(format!(
            "missing 'type: subject' separator; expected one of {} followed by ': '",
            COMMIT_TYPES.join("|")
        ));
        return CommitCheck { is_valid: false, errors, parsed: None };
    };

    let (commit_type, scope) = match header.split_once('(') {
        Some((t, tail)) => match tail.strip_suffix(')') {
            Some(scope) if !scope.trim().is_empty() => (t.trim(), Some(scope.trim().to_string())),
            _ => {
                errors.push("malformed scope; expected 'type(scope): subject'".to_string());
                (t.trim(), None)
            }
        },
        None => (header.trim(), None),
    };

    if !COMMIT_TYPES.contains(&commit_type) {
        errors.push(format!(
            "unknown commit type '{}'; expected one of {}",
            commit_type,
            COMMIT_TYPES.join(", ")
        ));
    }

    if !rest.starts_with(' ') && !rest.is_empty() {
        errors.push("missing space after ':'".to_string());
    }

    let (subject, issue_ref) = split_issue_ref(rest.trim());
    if subject.is_empty() {
        errors.push("empty subject".to_string());
    }
    if subject.chars().count() > MAX_SUBJECT_LEN {
        errors.push(format!(
            "subject is {} characters, maximum is {}",
            subject.chars().count(),
            MAX_SUBJECT_LEN
        ));
    }

    let is_valid = errors.is_empty();
    let parsed = is_valid.then(|| CommitMessage {
        raw: first_line.to_string(),
        commit_type: commit_type.to_string(),
        scope,
        subject: subject.to_string(),
        issue_ref,
    });
    CommitCheck { is_valid, errors, parsed }
}

fn split_issue_ref(subject: &str) -> (&str, Option<String>) {
    let Some(last) = subject.rsplit(' ').next() else {
        return (subject, None);
    };
    let token = last.trim_matches(|c| c == '(' || c == ')');
    if token.starts_with('#') && token[1..].chars().all(|c| c.is_ascii_digit()) && token.len() > 1 {
        let cut = subject.len() - last.len();
        (subject[..cut].trim_end(), Some(token.to_string()))
    } else {
        (subject, None)
    }
}

/// Best-effort correction for a free-text message: infer the most likely
/// type from the leading verb and normalize the subject. Heuristic only;
/// the caller must present it as an accept/reject choice, never apply it
/// silently. Returns None when the message is already valid or no intent
/// is inferable.
pub fn suggest_fix(message: &str) -> Option<String> {
    if validate(message).is_valid {
        return None;
    }
    let first_line = message.lines().next()?.trim();
    if first_line.is_empty() {
        return None;
    }

    let mut words = first_line.split_whitespace();
    let verb = words.next()?.to_ascii_lowercase();
    let verb = verb.trim_end_matches(|c: char| !c.is_ascii_alphabetic());
    let inferred = infer_type(verb)?;

    let mut subject = first_line.to_string();
    // Drop an existing broken "type:" prefix rather than stacking two.
    if let Some((head, tail)) = first_line.split_once(':') {
        if head.split('(').next().map(str::trim).is_some_and(|t| !t.contains(' ')) {
            subject = tail.trim().to_string();
        }
    }
    if subject.is_empty() {
        return None;
    }
    let mut chars = subject.chars();
    let lowered = match chars.next() {
        Some(c) => c.to_lowercase().collect::<String>() + chars.as_str(),
        None => return None,
    };
    let truncated: String = lowered.chars().take(MAX_SUBJECT_LEN).collect();
    let candidate = format!("{inferred}: {truncated}");
    // Only offer suggestions that actually validate.
    validate(&candidate).is_valid.then_some(candidate)
}

fn infer_type(verb: &str) -> Option<&'static str> {
    match verb {
        "add" | "added" | "adding" | "create" | "created" | "implement" | "implemented"
        | "introduce" | "introduced" => Some("feat"),
        "fix" | "fixed" | "fixes" | "fixing" | "repair" | "repaired" | "correct" | "corrected"
        | "resolve" | "resolved" => Some("fix"),
        "document" | "documented" | "doc" | "docs" => Some("docs"),
        "test" | "tested" | "tests" => Some("test"),
        "refactor" | "refactored" | "restructure" | "rework" | "reworked" => Some("refactor"),
        "update" | "updated" | "bump" | "bumped" | "upgrade" | "upgraded" | "remove"
        | "removed" | "clean" | "cleaned" => Some("chore"),
        _ => None,
    }
}
