//! Deterministic keyword parser used when the model is unavailable or
//! answers with something that does not decode.

use shipyard_core::url::{mentions_known_host, normalize_repo_url};
use shipyard_core::{Action, IntentDraft, ParseSource};

const APPLY_KEYWORDS: &[&str] = &["적용", "배포", "생성", "apply", "deploy", "create"];
const SHOW_KEYWORDS: &[&str] = &["보여", "표시", "조회", "show", "display", "list"];
const DRY_RUN_KEYWORDS: &[&str] = &["dry-run", "dryrun", "테스트", "시뮬레이션", "test"];
const BRANCH_KEYWORDS: &[&str] = &["branch", "브랜치"];

pub const FALLBACK_CONFIDENCE: f64 = 0.5;
pub const FALLBACK_CONFIDENCE_WITH_URL: f64 = 0.7;

/// Strip wrapping punctuation and anything glued on after the ASCII part,
/// e.g. a Korean particle: `github.com/org/repo의` -> `github.com/org/repo`.
fn clean_token(token: &str) -> &str {
    const LEADING: &str = "([<\"'`";
    const TRAILING: &str = ",.;:!?)]>\"'`";
    token
        .trim_start_matches(|c: char| LEADING.contains(c))
        .trim_end_matches(|c: char| !c.is_ascii() || TRAILING.contains(c))
}

fn is_manifest_name(token: &str) -> bool {
    let lower = token.to_ascii_lowercase();
    (lower.ends_with(".yaml") && lower.len() > 5) || (lower.ends_with(".yml") && lower.len() > 4)
}

/// Whether the instruction asks for a simulated run.
pub fn mentions_dry_run(instruction: &str) -> bool {
    let lower = instruction.to_lowercase();
    DRY_RUN_KEYWORDS.iter().any(|k| lower.contains(k))
}

pub fn fallback_parse(instruction: &str, default_action: Action) -> IntentDraft {
    let lower = instruction.to_lowercase();
    let contains_any = |keywords: &[&str]| keywords.iter().any(|k| lower.contains(k));

    let action = if contains_any(APPLY_KEYWORDS) {
        Action::Apply
    } else if contains_any(SHOW_KEYWORDS) {
        Action::Show
    } else {
        default_action
    };
    let dry_run = mentions_dry_run(instruction);

    let tokens: Vec<&str> = instruction.split_whitespace().collect();

    let repository_url = tokens
        .iter()
        .map(|t| clean_token(t))
        .find(|t| mentions_known_host(t))
        .map(normalize_repo_url)
        .unwrap_or_default();

    let filename = tokens
        .iter()
        .map(|t| clean_token(t))
        .find(|t| is_manifest_name(t) && !mentions_known_host(t))
        .map(str::to_string);

    // The token after the last word mentioning "branch" that has one. Misfires
    // on prose such as "the branch is fine".
    let branch = tokens
        .windows(2)
        .filter(|pair| {
            let word = pair[0].to_lowercase();
            BRANCH_KEYWORDS.iter().any(|k| word.contains(k))
        })
        .last()
        .map(|pair| clean_token(pair[1]).to_string())
        .filter(|b| !b.is_empty());

    let confidence = if repository_url.is_empty() {
        FALLBACK_CONFIDENCE
    } else {
        FALLBACK_CONFIDENCE_WITH_URL
    };

    IntentDraft {
        repository_url,
        branch,
        filename,
        action,
        namespace: None,
        dry_run,
        confidence,
        parse_source: ParseSource::Fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn korean_apply_instruction() {
        let draft = fallback_parse("github.com/org/repo 의 app.yaml 적용해줘", Action::Show);
        assert_eq!(draft.repository_url, "https://github.com/org/repo.git");
        assert_eq!(draft.filename.as_deref(), Some("app.yaml"));
        assert_eq!(draft.action, Action::Apply);
        assert!(!draft.dry_run);
        assert_eq!(draft.confidence, FALLBACK_CONFIDENCE_WITH_URL);
        assert_eq!(draft.parse_source, ParseSource::Fallback);
    }

    #[test]
    fn glued_particle_and_punctuation_trimmed() {
        let draft = fallback_parse(
            "github.com/org/repo의 deployment.yml을 dry-run으로 배포해",
            Action::Show,
        );
        assert_eq!(draft.repository_url, "https://github.com/org/repo.git");
        assert_eq!(draft.filename.as_deref(), Some("deployment.yml"));
        assert!(draft.dry_run);
        assert_eq!(draft.action, Action::Apply);
    }

    #[test]
    fn show_and_default_action() {
        let show = fallback_parse("list the manifests in gitlab.com/a/b", Action::Apply);
        assert_eq!(show.action, Action::Show);
        assert_eq!(show.repository_url, "https://gitlab.com/a/b.git");

        let neither = fallback_parse("bitbucket.org/t/r please", Action::Apply);
        assert_eq!(neither.action, Action::Apply);
    }

    #[test]
    fn no_url_means_low_confidence() {
        let draft = fallback_parse("deploy app.yaml somewhere", Action::Show);
        assert!(draft.repository_url.is_empty());
        assert_eq!(draft.confidence, FALLBACK_CONFIDENCE);
    }

    #[test]
    fn https_url_kept() {
        let draft = fallback_parse("show https://github.com/org/repo.git, thanks", Action::Show);
        assert_eq!(draft.repository_url, "https://github.com/org/repo.git");
    }

    #[test]
    fn branch_keyword_takes_next_token() {
        let draft = fallback_parse("apply github.com/o/r branch dev", Action::Show);
        assert_eq!(draft.branch.as_deref(), Some("dev"));

        let ko = fallback_parse("github.com/o/r 브랜치 release-1 배포", Action::Show);
        assert_eq!(ko.branch.as_deref(), Some("release-1"));

        let none = fallback_parse("apply github.com/o/r", Action::Show);
        assert_eq!(none.branch, None);
    }

    #[test]
    fn last_branch_keyword_wins() {
        let draft = fallback_parse(
            "apply github.com/o/r branch dev, no wait, branch prod",
            Action::Show,
        );
        assert_eq!(draft.branch.as_deref(), Some("prod"));

        // a trailing keyword with nothing after it does not reset the branch
        let trailing =
            fallback_parse("apply github.com/o/r branch dev on that branch", Action::Show);
        assert_eq!(trailing.branch.as_deref(), Some("dev"));
    }

    #[test]
    fn test_keyword_sets_dry_run() {
        let draft = fallback_parse("테스트 github.com/o/r 적용", Action::Show);
        assert!(draft.dry_run);
    }
}
