use beatkeeper::audio::{ManualClock, RecordingSource};
use beatkeeper::metronome::{
    Beat, BeatKind, BeatPattern, ManualTimer, MetronomeEvent, Scheduler, SchedulerConfig,
};
use crossbeam::channel;
use std::sync::Arc;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Tempo Change Example");
    println!("Plays one bar at 120 BPM, then switches to 60 BPM mid-bar");

    let clock = Arc::new(ManualClock::new(0.0));
    let timer = Arc::new(ManualTimer::new(Arc::clone(&clock)));
    let sound = Arc::new(RecordingSource::new());
    let (tx, rx) = channel::unbounded();

    let pattern = BeatPattern::from_beats(vec![
        Beat::new(BeatKind::Accented),
        Beat::new(BeatKind::Normal),
        Beat::new(BeatKind::Soft),
        Beat::new(BeatKind::Normal),
    ])?;
    let scheduler = Scheduler::new(
        pattern,
        120.0,
        SchedulerConfig::default(),
        clock.clone(),
        sound.clone(),
        timer.clone(),
        tx,
    );

    scheduler.start();
    timer.run_until(1.0);

    println!("Switching to 60 BPM at t=1.0s...");
    scheduler.set_tempo(60.0);
    timer.run_until(5.0);
    scheduler.stop();

    for event in rx.try_iter() {
        if let MetronomeEvent::Beat { index, kind, at } = event {
            println!("  {:>6.3}s  beat {}  {}", at, index + 1, kind.label());
        }
    }
    println!("{} clicks scheduled", sound.audible().len());

    println!("Example completed successfully!");
    Ok(())
}
