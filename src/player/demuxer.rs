use crate::core::{MediaInfo, PreviewError, Result};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::{format, media};
use log::{debug, info};
use std::path::Path;

/// 数据包所属的流
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Video,
    Audio,
}

/// 解封装器 - 读取本地媒体文件并分离音视频流
pub struct Demuxer {
    input_ctx: format::context::Input,
    video_stream_index: usize,
    audio_stream_index: Option<usize>,
    media_info: MediaInfo,
}

impl Demuxer {
    pub fn open(path: &Path) -> Result<Self> {
        info!("正在打开文件: {}", path.display());

        let input_ctx = format::input(path)
            .map_err(|e| PreviewError::OpenError(format!("{}: {}", path.display(), e)))?;

        let video_stream_index = input_ctx
            .streams()
            .best(media::Type::Video)
            .map(|s| s.index())
            .ok_or(PreviewError::NoVideoStream)?;

        let audio_stream_index = input_ctx
            .streams()
            .best(media::Type::Audio)
            .map(|s| s.index());

        debug!("视频流索引: {}, 音频流索引: {:?}", video_stream_index, audio_stream_index);

        let mut demuxer = Self {
            input_ctx,
            video_stream_index,
            audio_stream_index,
            media_info: MediaInfo::default(),
        };
        demuxer.media_info = demuxer.extract_media_info()?;

        Ok(demuxer)
    }

    fn extract_media_info(&self) -> Result<MediaInfo> {
        let video_stream = self.video_stream()?;
        let parameters = video_stream.parameters();
        let video_codec = parameters.id().name().to_string();

        let decoder = ffmpeg::codec::context::Context::from_parameters(parameters)?
            .decoder()
            .video()?;

        let rate = video_stream.avg_frame_rate();
        let fps = if rate.denominator() != 0 {
            rate.numerator() as f64 / rate.denominator() as f64
        } else {
            0.0
        };

        // 微秒转毫秒；未知时长时 FFmpeg 返回负值
        let duration = (self.input_ctx.duration() / 1000).max(0);

        let (audio_codec, sample_rate, channels) = match self.audio_stream()? {
            Some(stream) => {
                let parameters = stream.parameters();
                let name = parameters.id().name().to_string();
                let audio = ffmpeg::codec::context::Context::from_parameters(parameters)?
                    .decoder()
                    .audio()?;
                (Some(name), audio.rate(), audio.channels())
            }
            None => (None, 0, 0),
        };

        Ok(MediaInfo {
            duration,
            width: decoder.width(),
            height: decoder.height(),
            fps,
            video_codec,
            audio_codec,
            sample_rate,
            channels,
        })
    }

    pub fn video_stream(&self) -> Result<format::stream::Stream<'_>> {
        self.input_ctx
            .stream(self.video_stream_index)
            .ok_or(PreviewError::NoVideoStream)
    }

    pub fn audio_stream(&self) -> Result<Option<format::stream::Stream<'_>>> {
        match self.audio_stream_index {
            Some(index) => self
                .input_ctx
                .stream(index)
                .map(Some)
                .ok_or_else(|| PreviewError::OpenError(format!("音频流 {} 不存在", index))),
            None => Ok(None),
        }
    }

    /// 读取下一个音视频数据包，其他流的包被跳过；文件结束返回 None
    pub fn read_packet(&mut self) -> Option<(PacketKind, ffmpeg::Packet)> {
        let video = self.video_stream_index;
        let audio = self.audio_stream_index;

        for (stream, packet) in self.input_ctx.packets() {
            let index = stream.index();
            if index == video {
                return Some((PacketKind::Video, packet));
            }
            if Some(index) == audio {
                return Some((PacketKind::Audio, packet));
            }
        }
        None
    }

    /// Seek 到指定位置（毫秒）
    pub fn seek(&mut self, timestamp_ms: i64) -> Result<()> {
        let timestamp = timestamp_ms * 1000; // 毫秒转微秒
        self.input_ctx.seek(timestamp, ..timestamp)?;
        Ok(())
    }

    pub fn media_info(&self) -> &MediaInfo {
        &self.media_info
    }
}
