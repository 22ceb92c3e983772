use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{info, warn};
use std::path::PathBuf;

mod chords;
mod error;
mod midi;
mod piece;
mod score;
mod section;
mod smf;

use midi::{format_duration, inspect};
use score::Meta;

const OUTFILE: &str = "Echoes_of_Light_Full_Cinematic.mid";

#[derive(Parser, Debug)]
#[command(about = "Render \"Echoes of Light\" to a multi-track MIDI file")]
struct Opt {
    /// Where to write the .mid file
    #[arg(short, long, default_value = OUTFILE)]
    out: PathBuf,
    /// Tempo in beats per minute
    #[arg(long, default_value_t = 100)]
    bpm: u32,
    /// Ticks per quarter note
    #[arg(long, default_value_t = 480)]
    ppq: u16,
    /// Title written into the file
    #[arg(long)]
    title: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let opt = Opt::parse();

    if opt.bpm == 0 {
        bail!("--bpm must be above 0");
    }
    let mut meta = Meta { bpm: opt.bpm, ticks_per_beat: opt.ppq, ..Meta::default() };
    if let Some(title) = opt.title {
        meta.title = title;
    }

    let arrangement = piece::echoes_of_light();
    for sec in arrangement.sections() {
        info!(
            "{:<10} bars {:>2}–{:>2}  {}",
            sec.name,
            sec.start_bar,
            sec.end_bar() - 1,
            sec.progression.join(" ")
        );
    }

    let score = arrangement
        .render(meta)
        .inspect_err(|e| log::error!("{:?} error", e.kind()))
        .context("rendering score")?;
    info!(
        "{} notes on {} tracks, {} beats",
        score.event_count(),
        score.tracks().len(),
        score.length_beats()
    );

    let bytes =
        smf::write_smf(&score, &opt.out).with_context(|| format!("writing {:?}", opt.out))?;

    let tl = inspect(&opt.out)?;
    info!(
        "Wrote {} ({} bytes, {:.0} BPM, {})",
        opt.out.display(),
        bytes,
        tl.bpm(),
        format_duration(tl.last_t_us)
    );
    log::debug!("tracks: {}", tl.track_names.join(", "));
    log::debug!("programs (channel, program): {:?}", tl.programs);
    if let Some(n) = tl.notes.first() {
        log::debug!(
            "first note: channel {} key {} vel {} at {} µs",
            n.channel + 1,
            n.key,
            n.vel,
            n.t_us
        );
    }
    for (ch, n) in tl.per_channel.iter().enumerate().filter(|(_, n)| **n > 0) {
        log::debug!("channel {:>2}: {} notes", ch + 1, n);
    }
    if tl.notes.len() != score.event_count() {
        warn!("read back {} notes, placed {}", tl.notes.len(), score.event_count());
    }

    Ok(())
}
