use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::time::TIME_FORMAT;

/// Placeholder printed for absent fields.
pub const NONE_LABEL: &str = "无";

/// One entry of the home feed, original or repost.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub user_id: String,
    pub is_repost: bool,
    pub content: String,
    pub article_url: Option<String>,
    /// Pictures of the post itself (on a repost: images linked from the repost reason).
    pub original_pictures: Vec<String>,
    /// Pictures of the quoted post; only set on reposts.
    pub repost_pictures: Vec<String>,
    pub video_url: Option<String>,
    pub publish_place: Option<String>,
    #[serde(with = "minute_time")]
    pub publish_time: Option<NaiveDateTime>,
    pub publish_tool: Option<String>,
    pub like_count: u64,
    pub repost_count: u64,
    pub comment_count: u64,
}

impl Post {
    /// Publish time formatted at minute resolution, if known.
    #[must_use]
    pub fn publish_time_label(&self) -> Option<String> {
        self.publish_time.map(|t| t.format(TIME_FORMAT).to_string())
    }
}

fn or_none(value: Option<&str>) -> &str {
    value.filter(|v| !v.is_empty()).unwrap_or(NONE_LABEL)
}

fn join_or_none(urls: &[String]) -> String {
    if urls.is_empty() {
        NONE_LABEL.to_string()
    } else {
        urls.join(",")
    }
}

impl fmt::Display for Post {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.content)?;
        writeln!(f, "微博id: {}", self.id)?;
        writeln!(f, "用户id: {}", or_none(Some(&self.user_id)))?;
        writeln!(f, "是否原创: {}", if self.is_repost { "否" } else { "是" })?;
        writeln!(f, "头条文章url: {}", or_none(self.article_url.as_deref()))?;
        writeln!(f, "原始图片url: {}", join_or_none(&self.original_pictures))?;
        if self.is_repost {
            writeln!(f, "被转发微博图片url: {}", join_or_none(&self.repost_pictures))?;
        }
        writeln!(f, "视频url: {}", or_none(self.video_url.as_deref()))?;
        writeln!(f, "微博发布位置: {}", or_none(self.publish_place.as_deref()))?;
        writeln!(
            f,
            "微博发布时间: {}",
            or_none(self.publish_time_label().as_deref())
        )?;
        writeln!(f, "微博发布工具: {}", or_none(self.publish_tool.as_deref()))?;
        writeln!(f, "点赞数: {}", self.like_count)?;
        writeln!(f, "转发数: {}", self.repost_count)?;
        write!(f, "评论数: {}", self.comment_count)
    }
}

mod minute_time {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::feed::time::TIME_FORMAT;

    pub fn serialize<S: Serializer>(
        value: &Option<NaiveDateTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(time) => serializer.serialize_some(&time.format(TIME_FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<NaiveDateTime>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        raw.map(|s| {
            NaiveDateTime::parse_from_str(&s, TIME_FORMAT).map_err(serde::de::Error::custom)
        })
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn sample() -> Post {
        Post {
            id: "Nabc".to_string(),
            user_id: "1001".to_string(),
            content: "hello".to_string(),
            publish_time: NaiveDate::from_ymd_opt(2024, 3, 15)
                .unwrap()
                .and_hms_opt(14, 30, 0),
            like_count: 3,
            repost_count: 1,
            ..Post::default()
        }
    }

    #[test]
    fn test_display_uses_placeholder() {
        let text = sample().to_string();
        assert!(text.starts_with("hello\n"));
        assert!(text.contains("视频url: 无"));
        assert!(text.contains("微博发布时间: 2024-03-15 14:30"));
        assert!(!text.contains("被转发微博图片url"));
    }

    #[test]
    fn test_serializes_time_at_minute_resolution() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["publish_time"], "2024-03-15 14:30");
        let back: Post = serde_json::from_value(json).unwrap();
        assert_eq!(back, sample());
    }
}
