//! Модуль для отслеживания прогресса задачи озвучки
//!
//! Прогресс отправляется через канал Tokio; если отправитель не задан,
//! обновления просто отбрасываются.

use tokio::sync::mpsc::Sender;

/// Обновление прогресса для отправки клиенту
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressUpdate {
    /// Началась обработка
    Started,
    /// Парсинг субтитров
    ParsingSubtitles,
    /// Субтитры объединены по промежуткам
    Merged {
        /// Количество субтитров до объединения
        before: usize,
        /// Количество сегментов после объединения
        after: usize,
    },
    /// Клип сегмента подогнан под бюджет
    SegmentFitted {
        /// Сколько сегментов уже готово
        current: usize,
        /// Общее количество сегментов
        total: usize,
    },
    /// Клип сегмента записан на выходной таймлайн
    SegmentPlaced {
        /// Номер сегмента
        index: usize,
        /// Общее количество сегментов
        total: usize,
    },
    /// Кодирование аудио
    Encoding,
    /// Обработка завершена
    Finished,
}

/// Асинхронно отправляет обновление прогресса
pub async fn send_progress(sender: &Option<Sender<ProgressUpdate>>, update: ProgressUpdate) {
    if let Some(sender) = sender {
        let _ = sender.send(update).await;
    }
}
