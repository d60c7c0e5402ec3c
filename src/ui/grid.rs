/// Thumbnail grid
/// Lays delivered images out left to right, wrapping to the window width
use iced::widget::{column, container, image, scrollable, text};
use iced::{Alignment, Element, Length};
use iced_aw::Wrap;

use photo_stream::imaging::thumbnail::THUMBNAIL_SIZE;
use photo_stream::state::gallery::{Gallery, GalleryItem};

use crate::Message;

/// Spacing between tiles, both directions
const TILE_SPACING: f32 = 8.0;

pub fn view(gallery: &Gallery) -> Element<'_, Message> {
    if gallery.is_empty() {
        return container(text("No images yet. Pick a download mode above.").size(14))
            .padding(20)
            .into();
    }

    let tiles: Vec<Element<'_, Message>> = gallery.items().iter().map(tile).collect();

    scrollable(
        Wrap::with_elements(tiles)
            .spacing(TILE_SPACING)
            .line_spacing(TILE_SPACING),
    )
    .width(Length::Fill)
    .height(Length::Fill)
    .into()
}

fn tile(item: &GalleryItem) -> Element<'_, Message> {
    let name = item
        .path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    column![
        image(item.thumbnail.clone()).width(Length::Fixed(THUMBNAIL_SIZE as f32)),
        text(format!("{name} ({}x{})", item.width, item.height)).size(12),
    ]
    .spacing(4)
    .align_x(Alignment::Center)
    .into()
}
