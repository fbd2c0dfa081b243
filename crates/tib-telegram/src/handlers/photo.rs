use teloxide::types::PhotoSize;

use tib_core::{
    domain::{ChatId, UserId},
    messaging::types::{IncomingUpdate, PhotoMessage},
};

pub(super) fn to_update(
    chat_id: ChatId,
    user_id: UserId,
    username: Option<String>,
    photos: &[PhotoSize],
    caption: Option<&str>,
) -> Option<IncomingUpdate> {
    let idx = largest_by_area(photos.iter().map(|p| (p.width, p.height)))?;
    let best = &photos[idx];
    tracing::debug!(
        user_id = user_id.0,
        width = best.width,
        height = best.height,
        "photo received"
    );

    Some(IncomingUpdate::Photo(PhotoMessage {
        chat_id,
        user_id,
        username,
        file_id: best.file.id.clone(),
        caption: caption.map(str::to_string),
    }))
}

/// Index of the highest-resolution size. Ties go to the later entry, matching
/// Telegram's smallest-to-largest ordering.
fn largest_by_area(sizes: impl Iterator<Item = (u32, u32)>) -> Option<usize> {
    sizes
        .enumerate()
        .max_by_key(|(_, (w, h))| u64::from(*w) * u64::from(*h))
        .map(|(i, _)| i)
}
