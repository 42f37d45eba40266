//! Cache key generators and invalidation tags for consistent naming.
//!
//! Keys are namespaced under [`CACHE_PREFIX`]. Tags group the entries a write
//! must invalidate: saving a submission invalidates [`tags::SUBMISSIONS`],
//! [`tags::LEADERBOARD`] and the submitter's [`tags::user`] tag.

/// Prefix for all cache keys to namespace them.
pub const CACHE_PREFIX: &str = "defis:cache";

/// Invalidation tags.
pub mod tags {
    /// Challenge listings and details.
    pub const CHALLENGES: &str = "challenges";
    /// Submission listings and counts.
    pub const SUBMISSIONS: &str = "submissions";
    /// Rankings derived from points.
    pub const LEADERBOARD: &str = "leaderboard";
    /// Badge catalog and awarded badges.
    pub const BADGES: &str = "badges";
    /// Challenge categories.
    pub const CATEGORIES: &str = "categories";

    /// Tag grouping every entry derived from one user's data.
    #[must_use]
    pub fn user(user_id: impl std::fmt::Display) -> String {
        format!("user:{}", user_id)
    }
}

/// Generate a cache key for a challenge by ID.
#[must_use]
pub fn challenge_by_id(id: impl std::fmt::Display) -> String {
    format!("{}:challenge:id:{}", CACHE_PREFIX, id)
}

/// Generate a cache key for the challenge of the day (`YYYY-MM-DD`).
#[must_use]
pub fn daily_challenge(date: &str) -> String {
    format!("{}:challenge:daily:{}", CACHE_PREFIX, date)
}

/// Generate a cache key for the active challenges of a category.
#[must_use]
pub fn challenges_by_category(category_slug: &str) -> String {
    format!("{}:challenge:category:{}", CACHE_PREFIX, category_slug.to_lowercase())
}

/// Generate a cache key for a user's profile with points and level.
#[must_use]
pub fn user_profile(user_id: impl std::fmt::Display) -> String {
    format!("{}:user:profile:{}", CACHE_PREFIX, user_id)
}

/// Generate a cache key for a user's submissions.
#[must_use]
pub fn user_submissions(user_id: impl std::fmt::Display) -> String {
    format!("{}:submission:user:{}", CACHE_PREFIX, user_id)
}

/// Generate a cache key for the badges awarded to a user.
#[must_use]
pub fn user_badges(user_id: impl std::fmt::Display) -> String {
    format!("{}:badge:user:{}", CACHE_PREFIX, user_id)
}

/// Generate a cache key for a leaderboard page of a period (`all`, `month`, ...).
#[must_use]
pub fn leaderboard(period: &str, page: u32) -> String {
    format!("{}:leaderboard:{}:{}", CACHE_PREFIX, period.to_lowercase(), page)
}

/// Generate a cache key for the category list.
#[must_use]
pub fn categories() -> String {
    format!("{}:categories", CACHE_PREFIX)
}
