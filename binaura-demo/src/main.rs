mod output;

use anyhow::{Context, Result};
use binaura::{
    AttenuationCurveParams, AudioBuffer, AudioSettings, CurveType, PlayerEffect, Pose, Quat,
    SpatialBackend, SpatializerEffect, Vec3,
};
use output::OutputStream;
use std::f32::consts::TAU;
use std::time::{Duration, Instant};

const TONE_HZ: f32 = 330.0;
const ORBIT_RADIUS: f32 = 4.0;
const ORBIT_SECONDS: f32 = 6.0;
const TICK: Duration = Duration::from_millis(20);

struct Options {
    seconds: f32,
    steam: bool,
}

fn parse_args() -> Result<Options> {
    let mut options = Options {
        seconds: 12.0,
        steam: false,
    };
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--seconds" => {
                let value = args.next().context("--seconds needs a value")?;
                options.seconds = value.parse().context("invalid --seconds value")?;
            }
            "--steam" => options.steam = true,
            other => anyhow::bail!("unknown argument {}", other),
        }
    }
    Ok(options)
}

/// Source position on a horizontal circle around the listener.
fn orbit(elapsed: f32) -> Pose {
    let angle = TAU * elapsed / ORBIT_SECONDS;
    let position = Quat::from_rotation_y(angle) * Vec3::new(0.0, 0.0, -ORBIT_RADIUS);
    Pose::from_position(position)
}

fn run<B: SpatialBackend>(
    backend: B,
    settings: AudioSettings,
    seconds: f32,
    on_tick: impl Fn(&B, &Pose),
) -> Result<()> {
    let mut effect = SpatializerEffect::new(backend.clone());
    effect.initialize(&settings)?;
    effect.set_attenuation_curve_params(AttenuationCurveParams::new(
        1.0,
        20.0,
        CurveType::Logarithmic,
    ))?;
    effect.set_transform(orbit(0.0))?;

    let mut node = effect
        .detach_node()
        .context("spatializer has no node after initialize")?;
    let mut tone = AudioBuffer::new(1, settings.frame_size);
    let mut phase = 0.0f32;
    let step = TAU * TONE_HZ / settings.sample_rate as f32;
    let frame_size = settings.frame_size;

    let stream = OutputStream::start(settings, move |output: &mut AudioBuffer| {
        for sample in tone.channel_mut(0) {
            *sample = phase.sin() * 0.3;
            phase = (phase + step) % TAU;
        }
        node.process(Some(&tone), output, frame_size);
    })?;

    let listener = Pose::identity();
    let start = Instant::now();
    let mut last_report = 0;
    while start.elapsed().as_secs_f32() < seconds {
        let elapsed = start.elapsed().as_secs_f32();
        effect.set_transform(orbit(elapsed))?;
        on_tick(&backend, &listener);

        let second = elapsed as u64;
        if second != last_report {
            last_report = second;
            let snapshot = effect.snapshot();
            log::info!(
                "t={}s distance={:.2}m attenuation={:.3} frames={}",
                second,
                snapshot.listener_distance,
                snapshot.distance_attenuation,
                stream.frames_played()
            );
        }
        std::thread::sleep(TICK);
    }

    stream.stop()?;
    effect.shutdown();
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let options = parse_args()?;
    let settings = AudioSettings::new().sample_rate(48000).frame_size(512);
    settings.validate()?;

    if options.steam {
        #[cfg(feature = "steam-audio")]
        {
            let backend = binaura::SteamAudioBackend::new(&settings)?;
            return run(backend, settings, options.seconds, |backend, listener| {
                backend.simulate(listener)
            });
        }
        #[cfg(not(feature = "steam-audio"))]
        anyhow::bail!("built without the steam-audio feature");
    }

    run(
        binaura::PannerBackend::new(),
        settings,
        options.seconds,
        |_, _| {},
    )
}
