pub mod ffmpeg;

use anyhow::Result;

/// Destination for a finite sequence of RGBA frames.
pub trait FrameSink {
    fn write_frame(&mut self, rgba: &[u8]) -> Result<()>;

    /// Flush and close. The artifact is complete once this returns `Ok`.
    fn finish(&mut self) -> Result<()>;

    /// Drop whatever was produced so far.
    fn discard(&mut self);
}

/// Keeps frames in memory.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct CollectSink {
    pub frames: Vec<Vec<u8>>,
    pub finished: bool,
    pub discarded: bool,
}

#[cfg(test)]
impl FrameSink for CollectSink {
    fn write_frame(&mut self, rgba: &[u8]) -> Result<()> {
        if self.finished {
            anyhow::bail!("sink already finished");
        }
        self.frames.push(rgba.to_vec());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }

    fn discard(&mut self) {
        self.frames.clear();
        self.discarded = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collect_sink_rejects_writes_after_finish() {
        let mut sink = CollectSink::default();
        sink.write_frame(&[1, 2, 3, 4]).unwrap();
        sink.finish().unwrap();
        assert!(sink.write_frame(&[0; 4]).is_err());
        assert_eq!(sink.frames.len(), 1);
    }

    #[test]
    fn discard_drops_frames() {
        let mut sink = CollectSink::default();
        sink.write_frame(&[9; 4]).unwrap();
        sink.discard();
        assert!(sink.frames.is_empty());
        assert!(sink.discarded);
    }
}
