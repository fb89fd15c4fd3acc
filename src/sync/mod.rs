//! Модуль синхронизации озвучки с субтитрами
//!
//! - `plan`: бюджеты длительности сегментов;
//! - `controller`: подгонка клипа сегмента под бюджет;
//! - `assembler`: сборка выходной дорожки;
//! - `pipeline`: задача озвучки целиком.

pub mod assembler;
pub mod controller;
pub mod pipeline;
pub mod plan;

pub use assembler::{OutputTimeline, Placement, TimelineAssembler};
pub use controller::{
    fit_segment, next_rate_instruction, ControllerState, Decision, DurationController, FittedClip,
};
pub use pipeline::{dub_srt_file, DubReport, Dubber};
pub use plan::{plan_segments, SegmentPlan};

#[cfg(test)]
mod tests {
    mod stub;
    mod test_assembler;
    mod test_controller;
    mod test_pipeline;
}
