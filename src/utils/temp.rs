//! Модуль для работы с временными файлами
//!
//! Синтезаторы, которые пишут результат на диск, получают здесь уникальные
//! пути внутри временной директории задачи.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use parking_lot::Mutex;
use tempfile::TempDir;
use uuid::Uuid;

use crate::error::Result;

/// Временная директория одной задачи озвучки
pub struct ScratchDir {
    /// Временная директория (None после `keep`)
    temp_dir: Option<TempDir>,
    /// Путь к директории
    path: PathBuf,
    /// Идентификатор задачи, входит в имена файлов
    job_id: Uuid,
    /// Созданные файлы
    files: Mutex<Vec<PathBuf>>,
    /// Нужно ли удалять файлы
    cleanup: bool,
}

impl ScratchDir {
    /// Создать новую временную директорию
    pub fn new(cleanup: bool) -> Result<Self> {
        let temp_dir = tempfile::Builder::new().prefix("dub-sync-").tempdir()?;
        let path = temp_dir.path().to_path_buf();
        let job_id = Uuid::new_v4();
        debug!("Created scratch dir {} for job {}", path.display(), job_id);

        Ok(Self {
            temp_dir: Some(temp_dir),
            path,
            job_id,
            files: Mutex::new(Vec::new()),
            cleanup,
        })
    }

    /// Путь для клипа сегмента; уникален даже при параллельных вызовах
    pub fn clip_path(&self, segment_index: usize, attempt: u32, extension: &str) -> PathBuf {
        let file_name = format!(
            "{}_seg{:05}_try{}_{}.{}",
            self.job_id.simple(),
            segment_index,
            attempt,
            Uuid::new_v4().simple(),
            extension
        );
        let file_path = self.path.join(file_name);
        self.files.lock().push(file_path.clone());
        file_path
    }

    /// То же, что `clip_path`, но файл удаляется при выходе из области видимости
    pub fn clip_file(
        &self,
        segment_index: usize,
        attempt: u32,
        extension: &str,
    ) -> ScratchFile<'_> {
        ScratchFile {
            dir: self,
            path: self.clip_path(segment_index, attempt, extension),
        }
    }

    /// Удалить файл, если он больше не нужен
    pub fn release(&self, file_path: &Path) {
        if !self.cleanup {
            return;
        }
        if file_path.exists() {
            if let Err(e) = fs::remove_file(file_path) {
                warn!("Failed to remove temp file {}: {}", file_path.display(), e);
            }
        }
        self.files.lock().retain(|p| p != file_path);
    }

    /// Путь к временной директории
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    /// Количество файлов, которые еще не удалены
    pub fn pending_files(&self) -> usize {
        self.files.lock().len()
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if self.cleanup {
            // TempDir удалит директорию сам
            return;
        }
        if let Some(dir) = self.temp_dir.take() {
            let kept = dir.into_path();
            info!("Keeping temp files in {}", kept.display());
        }
    }
}

/// Временный файл, который освобождается при любом выходе из функции
pub struct ScratchFile<'a> {
    dir: &'a ScratchDir,
    path: PathBuf,
}

impl ScratchFile<'_> {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile<'_> {
    fn drop(&mut self) {
        self.dir.release(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_paths_are_unique() {
        let scratch = ScratchDir::new(true).unwrap();
        let a = scratch.clip_path(1, 0, "mp3");
        let b = scratch.clip_path(1, 0, "mp3");
        assert_ne!(a, b);
        assert!(a.starts_with(scratch.path()));
        assert_eq!(a.extension().unwrap(), "mp3");
        assert_eq!(scratch.pending_files(), 2);
    }

    #[test]
    fn test_release_and_drop_cleanup() {
        let scratch = ScratchDir::new(true).unwrap();
        let file = scratch.clip_path(3, 1, "mp3");
        fs::write(&file, b"data").unwrap();
        scratch.release(&file);
        assert!(!file.exists());
        assert_eq!(scratch.pending_files(), 0);

        let dir = scratch.path().to_path_buf();
        drop(scratch);
        assert!(!dir.exists());
    }

    #[test]
    fn test_scratch_file_released_on_drop() {
        let scratch = ScratchDir::new(true).unwrap();
        let path = {
            let file = scratch.clip_file(2, 0, "mp3");
            fs::write(file.path(), b"data").unwrap();
            file.path().to_path_buf()
        };
        assert!(!path.exists());
        assert_eq!(scratch.pending_files(), 0);
    }

    #[test]
    fn test_keep_files_when_cleanup_disabled() {
        let scratch = ScratchDir::new(false).unwrap();
        let file = scratch.clip_path(1, 0, "mp3");
        fs::write(&file, b"data").unwrap();
        scratch.release(&file);
        assert!(file.exists());

        let dir = scratch.path().to_path_buf();
        drop(scratch);
        assert!(dir.exists());
        fs::remove_dir_all(dir).unwrap();
    }
}
