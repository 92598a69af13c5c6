//! Structural view over one feed post container.
//!
//! A post on the feed page is a `div.c` whose direct child `div`s ("sub-blocks")
//! hold the author link, the content span, the picture anchors and the footer.
//! Lookups are named after what they find so extractors never index into the
//! tree by position.

use scraper::ElementRef;

use super::normalize::normalize_text;

/// Like action label; the last one in a block starts the footer.
pub const LIKE_MARKER: &str = "赞";
/// Anchor label of a truncated post.
pub const READ_MORE_MARKER: &str = "全文";
/// Separates the publish time from the client label.
pub const CLIENT_MARKER: &str = "来自";
/// Anchor label next to a place link.
pub const MAP_MARKER: &str = "显示地图";
/// Suffix of a video tag anchor in the content span.
pub const VIDEO_SUFFIX: &str = "视频";
/// Label of the quoted post's repost count on a detail page.
pub const ORIGINAL_REPOST_MARKER: &str = "原文转发";
/// Content prefix of a headline-article post.
pub const ARTICLE_MARKER: &str = "发布了头条文章";

/// Marker-token slicing over normalized text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerText<'a>(pub &'a str);

impl<'a> MarkerText<'a> {
    /// Text after the first colon, which ends the author prefix.
    #[must_use]
    pub fn after_author(self) -> Self {
        match self.0.find(':') {
            Some(pos) => Self(&self.0[pos + 1..]),
            None => self,
        }
    }

    /// Text before the last occurrence of `marker`; unchanged if absent.
    #[must_use]
    pub fn before_last(self, marker: &str) -> Self {
        match self.0.rfind(marker) {
            Some(pos) => Self(&self.0[..pos]),
            None => self,
        }
    }

    /// Text from the last occurrence of `marker` onward.
    #[must_use]
    pub fn from_last(self, marker: &str) -> Option<Self> {
        self.0.rfind(marker).map(|pos| Self(&self.0[pos..]))
    }

    #[must_use]
    pub fn as_str(self) -> &'a str {
        self.0
    }

    #[must_use]
    pub fn trimmed(self) -> String {
        self.0.trim().to_string()
    }
}

/// Normalized text of a subtree.
#[must_use]
pub fn element_text(element: ElementRef<'_>) -> String {
    normalize_text(&element.text().collect::<String>())
}

/// Normalized text of an anchor, trimmed.
#[must_use]
pub fn anchor_text(anchor: ElementRef<'_>) -> String {
    element_text(anchor).trim().to_string()
}

#[must_use]
pub fn href(element: ElementRef<'_>) -> Option<&str> {
    element.value().attr("href")
}

fn has_class(element: ElementRef<'_>, class: &str) -> bool {
    element.value().classes().any(|c| c == class)
}

fn child_elements<'a>(element: ElementRef<'a>, tag: &'a str) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    element
        .children()
        .filter_map(ElementRef::wrap)
        .filter(move |child| child.value().name() == tag)
}

fn descendant_elements<'a>(
    element: ElementRef<'a>,
    tag: &'a str,
) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    element
        .descendants()
        .skip(1)
        .filter_map(ElementRef::wrap)
        .filter(move |child| child.value().name() == tag)
}

/// One `div.c` post container.
#[derive(Debug, Clone, Copy)]
pub struct PostNode<'a> {
    element: ElementRef<'a>,
}

impl<'a> PostNode<'a> {
    #[must_use]
    pub fn new(element: ElementRef<'a>) -> Self {
        Self { element }
    }

    #[must_use]
    pub fn element(&self) -> ElementRef<'a> {
        self.element
    }

    /// Post id: the container's `id` attribute without its `M_` prefix.
    #[must_use]
    pub fn post_id(&self) -> Option<String> {
        let id = self.element.value().attr("id")?;
        let stripped: String = id.chars().skip(2).collect();
        (!stripped.is_empty()).then_some(stripped)
    }

    /// Normalized text of the whole container.
    #[must_use]
    pub fn text(&self) -> String {
        element_text(self.element)
    }

    /// Direct child `div`s.
    pub fn sub_blocks(&self) -> impl Iterator<Item = ElementRef<'a>> + 'a {
        child_elements(self.element, "div")
    }

    #[must_use]
    pub fn first_block(&self) -> Option<ElementRef<'a>> {
        self.sub_blocks().next()
    }

    #[must_use]
    pub fn last_block(&self) -> Option<ElementRef<'a>> {
        self.sub_blocks().last()
    }

    /// `span.cmt` elements directly inside any sub-block.
    pub fn comment_spans(&self) -> impl Iterator<Item = ElementRef<'a>> + 'a {
        self.sub_blocks()
            .flat_map(|block| child_elements(block, "span"))
            .filter(|span| has_class(*span, "cmt"))
    }

    /// Anchors directly inside any sub-block.
    pub fn block_anchors(&self) -> impl Iterator<Item = ElementRef<'a>> + 'a {
        self.sub_blocks().flat_map(|block| child_elements(block, "a"))
    }

    /// Hrefs of the anchors directly inside any sub-block.
    #[must_use]
    pub fn block_hrefs(&self) -> Vec<&'a str> {
        self.block_anchors().filter_map(href).collect()
    }

    /// Every anchor anywhere below the sub-blocks.
    pub fn all_anchors(&self) -> impl Iterator<Item = ElementRef<'a>> + 'a {
        self.sub_blocks().flat_map(|block| descendant_elements(block, "a"))
    }

    /// Every anchor anywhere below the first sub-block.
    pub fn first_block_anchors(&self) -> impl Iterator<Item = ElementRef<'a>> + 'a {
        self.first_block()
            .into_iter()
            .flat_map(|block| descendant_elements(block, "a"))
    }

    /// Anchors directly inside the first sub-block.
    pub fn first_block_direct_anchors(&self) -> impl Iterator<Item = ElementRef<'a>> + 'a {
        self.first_block()
            .into_iter()
            .flat_map(|block| child_elements(block, "a"))
    }

    /// Anchors directly inside the last sub-block.
    pub fn last_block_anchors(&self) -> impl Iterator<Item = ElementRef<'a>> + 'a {
        self.last_block()
            .into_iter()
            .flat_map(|block| child_elements(block, "a"))
    }

    /// The `span.ctt` content span of the first sub-block.
    #[must_use]
    pub fn content_span(&self) -> Option<ElementRef<'a>> {
        self.first_block()
            .and_then(|block| child_elements(block, "span").find(|span| has_class(*span, "ctt")))
    }

    /// Anchors directly inside the content span.
    #[must_use]
    pub fn content_anchors(&self) -> Vec<ElementRef<'a>> {
        self.content_span()
            .map(|span| child_elements(span, "a").collect())
            .unwrap_or_default()
    }

    /// The first `span.ct` time label directly inside a sub-block.
    #[must_use]
    pub fn time_span(&self) -> Option<ElementRef<'a>> {
        self.sub_blocks()
            .flat_map(|block| child_elements(block, "span"))
            .find(|span| has_class(*span, "ct"))
    }

    /// The author link (`a.nk`).
    #[must_use]
    pub fn author_anchor(&self) -> Option<ElementRef<'a>> {
        self.block_anchors().find(|a| has_class(*a, "nk"))
    }

    /// The first comment link (`a.cc`); on a repost it points at the quoted post.
    #[must_use]
    pub fn comment_anchor(&self) -> Option<ElementRef<'a>> {
        self.block_anchors().find(|a| has_class(*a, "cc"))
    }

    /// Author of the quoted post on a repost: first anchor inside a `span.cmt`.
    #[must_use]
    pub fn attributed_user(&self) -> Option<String> {
        self.comment_spans()
            .flat_map(|span| child_elements(span, "a"))
            .map(anchor_text)
            .find(|name| !name.is_empty())
    }

    /// Whether the container holds any image with a source.
    #[must_use]
    pub fn has_image(&self) -> bool {
        descendant_elements(self.element, "img").any(|img| img.value().attr("src").is_some())
    }

    /// Whether a sub-block carries content markup (`div > span.ctt`).
    #[must_use]
    pub fn has_content(&self) -> bool {
        self.sub_blocks()
            .flat_map(|block| child_elements(block, "span"))
            .any(|span| has_class(span, "ctt"))
    }

    /// Whether any anchor under the sub-blocks reads "read more".
    #[must_use]
    pub fn has_read_more(&self) -> bool {
        self.all_anchors().any(|a| anchor_text(a) == READ_MORE_MARKER)
    }

    /// Whether an anchor under the first sub-block reads "read more".
    #[must_use]
    pub fn first_block_has_read_more(&self) -> bool {
        self.first_block_anchors()
            .any(|a| anchor_text(a) == READ_MORE_MARKER)
    }
}

/// Source of the first `img` inside an anchor.
#[must_use]
pub fn anchor_image_src<'a>(anchor: ElementRef<'a>) -> Option<&'a str> {
    child_elements(anchor, "img").find_map(|img| img.value().attr("src"))
}
