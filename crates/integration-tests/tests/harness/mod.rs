//! Shared test harness: server wrapper, config builder, and mock backends

#![allow(dead_code)]

pub mod config;
pub mod mock_fal;
pub mod mock_google;
pub mod server;

/// A minimal PNG-sniffed buffer standing in for a room photo
pub const PNG_IMAGE: &[u8] = b"\x89PNG\r\n\x1a\nliving-room-photo";

/// A second distinct image for multi-image requests
pub const JPEG_IMAGE: &[u8] = b"\xff\xd8\xff\xe0kitchen-photo";

/// Build a multipart edit form with one image and optional text fields
pub fn edit_form(image: &[u8], prompt: Option<&str>, provider: Option<&str>) -> reqwest::multipart::Form {
    let mut form = reqwest::multipart::Form::new().part(
        "image",
        reqwest::multipart::Part::bytes(image.to_vec())
            .file_name("room.png")
            .mime_str("application/octet-stream")
            .unwrap(),
    );

    if let Some(prompt) = prompt {
        form = form.text("prompt", prompt.to_owned());
    }
    if let Some(provider) = provider {
        form = form.text("provider", provider.to_owned());
    }
    form
}
