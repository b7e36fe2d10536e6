//! Built-in extraction templates for common feeds.
//!
//! These are starting points, not guarantees: feed markup drifts, and a
//! preset that stops matching is meant to be dumped to TOML (`trawl init`)
//! and fixed by hand.

use indexmap::IndexMap;

use crate::models::template::{FieldTransform, Template};

/// Names accepted by [`by_name`].
pub const NAMES: [&str; 4] = ["twitter", "zhihu", "douban", "github"];

/// Look up a preset. `user` narrows the twitter preset to one profile and is
/// ignored by the others.
pub fn by_name(name: &str, user: Option<&str>) -> Option<Template> {
    match name {
        "twitter" | "x" => Some(twitter(user)),
        "zhihu" => Some(zhihu_answers()),
        "douban" => Some(douban_reviews()),
        "github" => Some(github_issues()),
        _ => None,
    }
}

/// Every preset, with placeholder parameters where needed.
pub fn all() -> Vec<Template> {
    vec![
        twitter(None),
        zhihu_answers(),
        douban_reviews(),
        github_issues(),
    ]
}

/// A profile timeline on x.com. With `user` the page match is pinned to that
/// profile; without it, any open X tab qualifies.
pub fn twitter(user: Option<&str>) -> Template {
    let (name, url_pattern) = match user {
        Some(user) => {
            let escaped = regex::escape(user);
            (
                format!("twitter_{user}"),
                format!(r"x\.com/{escaped}|twitter\.com/{escaped}"),
            )
        }
        None => ("twitter".to_string(), r"x\.com|twitter\.com".to_string()),
    };

    let mut fields = IndexMap::new();
    fields.insert("id".to_string(), r#"a[href*="/status/"]"#.to_string());
    fields.insert("text".to_string(), r#"[data-testid="tweetText"]"#.to_string());
    fields.insert("time".to_string(), "time".to_string());
    fields.insert(
        "author".to_string(),
        r#"div[data-testid="User-Name"] a"#.to_string(),
    );
    fields.insert("likes".to_string(), r#"[data-testid="like"]"#.to_string());
    fields.insert("replies".to_string(), r#"[data-testid="reply"]"#.to_string());
    fields.insert(
        "retweets".to_string(),
        r#"[data-testid="retweet"]"#.to_string(),
    );

    let mut transforms = IndexMap::new();
    transforms.insert(
        "text".to_string(),
        vec![
            FieldTransform::CollapseWhitespace,
            FieldTransform::DropAfter {
                marker: "Show more".to_string(),
            },
            FieldTransform::Trim,
        ],
    );
    for counter in ["likes", "replies", "retweets"] {
        transforms.insert(counter.to_string(), vec![FieldTransform::ParseCount]);
    }

    Template {
        name,
        url_pattern,
        item_selector: r#"article[data-testid="tweet"]"#.to_string(),
        fields,
        identity_field: "id".to_string(),
        expand_selectors: vec![r#"[data-testid="tweet-text-show-more-link"]"#.to_string()],
        expand_labels: vec!["show more".to_string()],
        quoted_container_selector: Some(r#"[data-testid="quotedTweet"]"#.to_string()),
        detail_path_marker: Some("/status/".to_string()),
        expand_delay_ms: 1_500,
        scroll_delay_ms: 2_500,
        scroll_enabled: true,
        scroll_selector: None,
        round_cap: 50,
        min_round_floor: 3,
        transforms,
        predicate: None,
        sort_field: Some("time".to_string()),
        sort_descending: true,
        end_markers: Vec::new(),
        loading_selectors: vec![r#"div[role="progressbar"]"#.to_string()],
    }
}

/// Answers under a zhihu question.
pub fn zhihu_answers() -> Template {
    let mut fields = IndexMap::new();
    fields.insert("author".to_string(), ".AuthorInfo-name".to_string());
    fields.insert("content".to_string(), ".RichContent-inner".to_string());
    fields.insert("votes".to_string(), ".VoteButton--up".to_string());
    fields.insert(
        "comments".to_string(),
        ".ContentItem-action.Button--withIcon".to_string(),
    );

    let mut transforms = IndexMap::new();
    transforms.insert(
        "content".to_string(),
        vec![FieldTransform::CollapseWhitespace, FieldTransform::Trim],
    );
    transforms.insert("votes".to_string(), vec![FieldTransform::ParseCount]);
    transforms.insert("comments".to_string(), vec![FieldTransform::ParseCount]);

    Template {
        name: "zhihu_answers".to_string(),
        url_pattern: r"zhihu\.com/question/\d+".to_string(),
        item_selector: ".AnswerCard, .ContentItem.AnswerItem".to_string(),
        fields,
        identity_field: "content".to_string(),
        expand_selectors: vec![
            ".ContentItem-more".to_string(),
            ".RichContent-inner--collapsed".to_string(),
        ],
        expand_labels: vec!["阅读全文".to_string(), "展开阅读全文".to_string()],
        quoted_container_selector: None,
        detail_path_marker: None,
        expand_delay_ms: 1_000,
        scroll_delay_ms: 2_000,
        scroll_enabled: true,
        scroll_selector: None,
        round_cap: 30,
        min_round_floor: 3,
        transforms,
        predicate: None,
        sort_field: None,
        sort_descending: true,
        end_markers: Vec::new(),
        loading_selectors: Vec::new(),
    }
}

/// Reviews under a douban subject.
pub fn douban_reviews() -> Template {
    let mut fields = IndexMap::new();
    fields.insert("title".to_string(), ".main-bd h2 a".to_string());
    fields.insert("author".to_string(), ".main-hd .name".to_string());
    fields.insert("rating".to_string(), ".main-title-rating".to_string());
    fields.insert("content".to_string(), ".short-content".to_string());
    fields.insert("votes".to_string(), ".action-btn.up span".to_string());

    let mut transforms = IndexMap::new();
    transforms.insert(
        "content".to_string(),
        vec![FieldTransform::CollapseWhitespace, FieldTransform::Trim],
    );
    transforms.insert("votes".to_string(), vec![FieldTransform::ParseCount]);

    Template {
        name: "douban_reviews".to_string(),
        url_pattern: r"douban\.com/subject/\d+/reviews".to_string(),
        item_selector: ".review-item".to_string(),
        fields,
        identity_field: "title".to_string(),
        expand_selectors: Vec::new(),
        expand_labels: Vec::new(),
        quoted_container_selector: None,
        detail_path_marker: None,
        expand_delay_ms: 1_000,
        scroll_delay_ms: 2_000,
        scroll_enabled: true,
        scroll_selector: None,
        round_cap: 20,
        min_round_floor: 3,
        transforms,
        predicate: None,
        sort_field: None,
        sort_descending: true,
        end_markers: Vec::new(),
        loading_selectors: Vec::new(),
    }
}

/// An issue list on github.com. Paginated rather than virtualized, so this
/// one runs as a single extraction pass.
pub fn github_issues() -> Template {
    let mut fields = IndexMap::new();
    fields.insert(
        "title".to_string(),
        r#"a[data-testid="issue-title"]"#.to_string(),
    );
    fields.insert("number".to_string(), "span[title]".to_string());
    fields.insert(
        "status".to_string(),
        r#"[data-testid="issue-row-status"]"#.to_string(),
    );
    fields.insert(
        "author".to_string(),
        r#"[data-testid="issue-row-author"]"#.to_string(),
    );

    let mut transforms = IndexMap::new();
    transforms.insert("number".to_string(), vec![FieldTransform::ExtractDigits]);
    transforms.insert(
        "title".to_string(),
        vec![FieldTransform::CollapseWhitespace, FieldTransform::Trim],
    );

    Template {
        name: "github_issues".to_string(),
        url_pattern: r"github\.com/[^/]+/[^/]+/issues".to_string(),
        fields,
        item_selector: r#"[data-testid="issue-row"]"#.to_string(),
        identity_field: "number".to_string(),
        expand_selectors: Vec::new(),
        expand_labels: Vec::new(),
        quoted_container_selector: None,
        detail_path_marker: None,
        expand_delay_ms: 1_000,
        scroll_delay_ms: 2_000,
        scroll_enabled: false,
        scroll_selector: None,
        round_cap: 50,
        min_round_floor: 3,
        transforms,
        predicate: None,
        sort_field: None,
        sort_descending: true,
        end_markers: Vec::new(),
        loading_selectors: Vec::new(),
    }
}
