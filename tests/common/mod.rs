// Shared helpers for integration tests

#![allow(dead_code)]

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use now_playing_lyrics::{
    artwork::{ArtworkError, ArtworkFetcher},
    lyrics::LyricLine,
    pool::Update,
};
use std::{
    collections::HashMap,
    io::Cursor,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbaImage::from_pixel(width, height, Rgba([10, 120, 200, 255]));
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(image)
        .write_to(&mut buf, ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

/// In-memory artwork source that counts every fetch.
#[derive(Default)]
pub struct CountingFetcher {
    images: Mutex<HashMap<String, Vec<u8>>>,
    calls: AtomicUsize,
}

impl CountingFetcher {
    pub fn serving(urls: &[&str]) -> Self {
        let fetcher = Self::default();
        {
            let mut images = fetcher.images.lock().unwrap();
            for url in urls {
                images.insert(url.to_string(), png_bytes(20, 10));
            }
        }
        fetcher
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ArtworkFetcher for CountingFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, ArtworkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.images
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or(ArtworkError::Status(404))
    }
}

pub fn synced_lines(words: &[&str]) -> Arc<Vec<LyricLine>> {
    Arc::new(
        words
            .iter()
            .enumerate()
            .map(|(i, w)| LyricLine::new(i as u64 * 2_000, *w))
            .collect(),
    )
}

pub fn update(title: &str, pic_url: &str, lines: Option<Arc<Vec<LyricLine>>>, index: usize) -> Update {
    Update {
        err: None,
        artists: vec!["First Artist".to_string(), "Second Artist".to_string()],
        now_playing: title.to_string(),
        pic_url: pic_url.to_string(),
        lines,
        index,
    }
}
