use anyhow::{Context, Result};
use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use super::FrameSink;

#[derive(Clone, Debug, PartialEq)]
pub struct EncoderOptions {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub codec: String,
    pub pix_fmt: String,
    pub crf: u32,
    pub bitrate: Option<String>,
}

/// Raw RGBA frames piped into an `ffmpeg` child process.
pub struct FfmpegEncoder {
    child: Option<Child>,
    output: PathBuf,
}

impl FfmpegEncoder {
    pub fn new(output: &Path, audio: Option<&Path>, options: &EncoderOptions) -> Result<Self> {
        let mut command = Command::new("ffmpeg");
        // Errors go straight to our stderr; an undrained pipe would stall the writes.
        command
            .args(build_args(output, audio, options))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit());
        // Keep Ctrl-C away from ffmpeg so an interrupted export can still be finalised.
        #[cfg(unix)]
        std::os::unix::process::CommandExt::process_group(&mut command, 0);
        let child = command.spawn().context("Failed to spawn ffmpeg. Is ffmpeg installed?")?;

        log::info!(
            "FFmpeg encoder started: {}x{} @ {}fps, codec={}",
            options.width,
            options.height,
            options.fps,
            options.codec
        );

        Ok(Self {
            child: Some(child),
            output: output.to_path_buf(),
        })
    }
}

impl FrameSink for FfmpegEncoder {
    fn write_frame(&mut self, rgba: &[u8]) -> Result<()> {
        let stdin = self
            .child
            .as_mut()
            .and_then(|c| c.stdin.as_mut())
            .context("FFmpeg stdin not available")?;
        stdin.write_all(rgba).context("Failed to write frame to ffmpeg")?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let mut child = self.child.take().context("FFmpeg encoder already closed")?;
        // Closing stdin signals EOF.
        drop(child.stdin.take());

        let status = child.wait().context("Failed to wait for ffmpeg")?;
        if !status.success() {
            anyhow::bail!("FFmpeg exited with {}", status);
        }

        log::info!("FFmpeg encoding complete: {}", self.output.display());
        Ok(())
    }

    fn discard(&mut self) {
        if let Some(mut child) = self.child.take() {
            drop(child.stdin.take());
            if let Err(e) = child.kill() {
                log::debug!("ffmpeg already exited: {}", e);
            }
            let _ = child.wait();
        }
        match std::fs::remove_file(&self.output) {
            Ok(()) => log::info!("Removed partial output {}", self.output.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("Could not remove partial output {}: {}", self.output.display(), e),
        }
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        if self.child.is_some() {
            self.discard();
        }
    }
}

fn build_args(output: &Path, audio: Option<&Path>, o: &EncoderOptions) -> Vec<OsString> {
    let mut args: Vec<OsString> = [
        "-y",
        "-hide_banner",
        "-loglevel", "error",
        "-f", "rawvideo",
        "-pixel_format", "rgba",
        "-video_size", &format!("{}x{}", o.width, o.height),
        "-framerate", &o.fps.to_string(),
        "-i", "pipe:0",
    ]
    .iter()
    .map(OsString::from)
    .collect();

    if let Some(audio) = audio {
        args.push("-i".into());
        args.push(audio.as_os_str().to_owned());
    }

    args.extend(["-c:v", o.codec.as_str(), "-pix_fmt", o.pix_fmt.as_str()].map(OsString::from));

    match &o.bitrate {
        Some(br) => args.extend(["-b:v", br.as_str()].map(OsString::from)),
        None => args.extend(["-crf", &o.crf.to_string(), "-preset", "medium"].map(OsString::from)),
    }

    if audio.is_some() {
        args.extend(["-c:a", "aac", "-b:a", "192k", "-shortest"].map(OsString::from));
    }

    args.push(output.as_os_str().to_owned());
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> EncoderOptions {
        EncoderOptions {
            width: 640,
            height: 360,
            fps: 30,
            codec: "libx264".into(),
            pix_fmt: "yuv420p".into(),
            crf: 18,
            bitrate: None,
        }
    }

    fn strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn video_only_args() {
        let args = strings(build_args(Path::new("out.mp4"), None, &options()));
        assert!(args.windows(2).any(|w| w == ["-video_size", "640x360"]));
        assert!(args.windows(2).any(|w| w == ["-loglevel", "error"]));
        assert!(args.windows(2).any(|w| w == ["-crf", "18"]));
        assert!(!args.contains(&"-shortest".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("out.mp4"));
        assert_eq!(args.iter().filter(|a| *a == "-i").count(), 1);
    }

    #[test]
    fn audio_and_bitrate_args() {
        let opts = EncoderOptions { bitrate: Some("5M".into()), ..options() };
        let args = strings(build_args(Path::new("out.mp4"), Some(Path::new("song.flac")), &opts));
        assert!(args.windows(2).any(|w| w == ["-i", "song.flac"]));
        assert!(args.windows(2).any(|w| w == ["-b:v", "5M"]));
        assert!(!args.contains(&"-crf".to_string()));
        assert!(args.contains(&"-shortest".to_string()));
    }
}
