use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Deserializer};

// ============================================================================
// Domain Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub id: String,
    pub display_name: String,
    pub account_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub name: String,
    pub translated_name: Option<String>,
}

/// An artwork as returned by the app API.
///
/// `images` holds the original-size URLs: every page of a multi-page work,
/// or the single original image otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Illust {
    pub id: String,
    pub title: String,
    pub caption: String,
    pub created_at: DateTime<FixedOffset>,
    pub author: UserIdentity,
    pub tags: Vec<Tag>,
    pub images: Vec<String>,
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub(crate) struct UserDetailResponse {
    pub user: Option<UserDto>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct IllustsResponse {
    #[serde(default)]
    pub illusts: Vec<IllustDto>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UserDto {
    #[serde(deserialize_with = "lossy_id")]
    id: String,
    name: String,
    #[serde(default)]
    account: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct IllustDto {
    #[serde(deserialize_with = "lossy_id")]
    id: String,
    title: String,
    #[serde(default)]
    caption: String,
    create_date: DateTime<FixedOffset>,
    user: UserDto,
    #[serde(default)]
    tags: Vec<TagDto>,
    #[serde(default)]
    meta_single_page: MetaSinglePage,
    #[serde(default)]
    meta_pages: Vec<MetaPage>,
}

#[derive(Debug, Deserialize)]
struct TagDto {
    name: String,
    translated_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct MetaSinglePage {
    original_image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MetaPage {
    image_urls: PageImageUrls,
}

#[derive(Debug, Deserialize)]
struct PageImageUrls {
    original: Option<String>,
    large: Option<String>,
}

/// Ids arrive as JSON numbers from most endpoints and as strings from others.
fn lossy_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Number(u64),
        Text(String),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Number(n) => n.to_string(),
        Id::Text(s) => s,
    })
}

impl From<UserDto> for UserIdentity {
    fn from(user: UserDto) -> Self {
        Self {
            id: user.id,
            display_name: user.name,
            account_name: user.account,
        }
    }
}

impl From<TagDto> for Tag {
    fn from(tag: TagDto) -> Self {
        // An empty translation is as good as none
        let translated_name = tag.translated_name.filter(|t| !t.trim().is_empty());
        Self {
            name: tag.name,
            translated_name,
        }
    }
}

impl From<IllustDto> for Illust {
    fn from(dto: IllustDto) -> Self {
        let images = if dto.meta_pages.is_empty() {
            dto.meta_single_page.original_image_url.into_iter().collect()
        } else {
            dto.meta_pages
                .into_iter()
                .filter_map(|page| page.image_urls.original.or(page.image_urls.large))
                .collect()
        };

        Self {
            id: dto.id,
            title: dto.title,
            caption: dto.caption,
            created_at: dto.create_date,
            author: dto.user.into(),
            tags: dto.tags.into_iter().map(Tag::from).collect(),
            images,
        }
    }
}
