//! Модуль для работы с медиафайлами
//!
//! Этот модуль содержит функции для обработки аудио.

pub mod audio;

pub use audio::{AudioClip, RenderedClip};
