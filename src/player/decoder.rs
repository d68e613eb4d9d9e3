use crate::core::{AudioFrame, PreviewError, Result, VideoFrame};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::{codec, format, software, util};
use ffmpeg_next::util::error::EAGAIN;
use log::{debug, warn};

fn time_base_of(stream: &format::stream::Stream) -> f64 {
    let tb = stream.time_base();
    tb.numerator() as f64 / tb.denominator().max(1) as f64
}

/// 软件视频解码器，输出 RGBA
pub struct VideoDecoder {
    decoder: codec::decoder::Video,
    scaler: Option<software::scaling::Context>,
    time_base: f64,
}

// SwsContext 本身不是 Send，解码器实例只会被移动到一个工作线程中使用
unsafe impl Send for VideoDecoder {}

impl VideoDecoder {
    pub fn from_stream(stream: format::stream::Stream) -> Result<Self> {
        let time_base = time_base_of(&stream);
        let decoder = codec::context::Context::from_parameters(stream.parameters())?
            .decoder()
            .video()?;

        debug!(
            "视频解码器: {}x{}, 格式: {:?}",
            decoder.width(),
            decoder.height(),
            decoder.format()
        );

        Ok(Self {
            decoder,
            scaler: None,
            time_base,
        })
    }

    pub fn decode(&mut self, packet: &ffmpeg::Packet) -> Result<Vec<VideoFrame>> {
        match self.decoder.send_packet(packet) {
            Ok(()) => {}
            Err(ffmpeg::Error::Eof) => {
                self.decoder.flush();
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        }
        self.receive_frames()
    }

    /// 丢弃解码器内部缓存的帧（Seek 后调用）
    pub fn flush(&mut self) {
        self.decoder.flush();
    }

    /// 文件读完后取出解码器中剩余的帧
    pub fn drain(&mut self) -> Result<Vec<VideoFrame>> {
        self.decoder.send_eof()?;
        let frames = self.receive_frames();
        self.decoder.flush();
        frames
    }

    fn receive_frames(&mut self) -> Result<Vec<VideoFrame>> {
        let mut frames = Vec::new();
        loop {
            let mut decoded = util::frame::Video::empty();
            match self.decoder.receive_frame(&mut decoded) {
                Ok(()) => frames.push(self.convert_frame(&decoded)?),
                Err(ffmpeg::Error::Other { errno: EAGAIN }) | Err(ffmpeg::Error::Eof) => break,
                Err(e) => {
                    warn!("视频解码错误（已跳过）: {}", e);
                    break;
                }
            }
        }
        Ok(frames)
    }

    fn convert_frame(&mut self, frame: &util::frame::Video) -> Result<VideoFrame> {
        let width = frame.width();
        let height = frame.height();

        let scaler = match &mut self.scaler {
            Some(scaler) => scaler,
            scaler @ None => scaler.insert(software::scaling::Context::get(
                frame.format(),
                width,
                height,
                util::format::Pixel::RGBA,
                width,
                height,
                software::scaling::Flags::BILINEAR,
            )?),
        };

        let mut rgba = util::frame::Video::empty();
        scaler.run(frame, &mut rgba)?;

        let pts = frame
            .timestamp()
            .map(|ts| (ts as f64 * self.time_base * 1000.0) as i64)
            .unwrap_or(0);

        // 去掉行尾填充，复制到连续内存
        let row_size = width as usize * 4;
        let stride = rgba.stride(0);
        let src = rgba.data(0);
        let mut data = Vec::with_capacity(row_size * height as usize);
        for y in 0..height as usize {
            let start = y * stride;
            data.extend_from_slice(&src[start..start + row_size]);
        }

        Ok(VideoFrame {
            pts,
            width,
            height,
            data,
        })
    }
}

/// 音频解码器，输出与音频设备一致的交错 f32 采样
pub struct AudioDecoder {
    decoder: codec::decoder::Audio,
    resampler: Option<software::resampling::Context>,
    time_base: f64,
    target_channels: u16,
    target_sample_rate: u32,
}

// 重采样上下文只在解码线程内使用
unsafe impl Send for AudioDecoder {}

impl AudioDecoder {
    pub fn from_stream(
        stream: format::stream::Stream,
        target_sample_rate: u32,
        target_channels: u16,
    ) -> Result<Self> {
        let time_base = time_base_of(&stream);
        let decoder = codec::context::Context::from_parameters(stream.parameters())?
            .decoder()
            .audio()?;

        debug!(
            "音频解码器: {} Hz, {} 声道 → 目标: {} Hz, {} 声道",
            decoder.rate(),
            decoder.channels(),
            target_sample_rate,
            target_channels
        );

        Ok(Self {
            decoder,
            resampler: None,
            time_base,
            target_channels,
            target_sample_rate,
        })
    }

    pub fn decode(&mut self, packet: &ffmpeg::Packet) -> Result<Vec<AudioFrame>> {
        match self.decoder.send_packet(packet) {
            Ok(()) => {}
            Err(ffmpeg::Error::Eof) => {
                self.decoder.flush();
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        }

        let mut frames = Vec::new();
        loop {
            let mut decoded = util::frame::Audio::empty();
            match self.decoder.receive_frame(&mut decoded) {
                Ok(()) => frames.push(self.convert_frame(&decoded)?),
                Err(ffmpeg::Error::Other { errno: EAGAIN }) | Err(ffmpeg::Error::Eof) => break,
                Err(e) => return Err(PreviewError::DecodeError(e.to_string())),
            }
        }
        Ok(frames)
    }

    pub fn flush(&mut self) {
        self.decoder.flush();
    }

    fn convert_frame(&mut self, frame: &util::frame::Audio) -> Result<AudioFrame> {
        let target_layout = match self.target_channels {
            1 => util::channel_layout::ChannelLayout::MONO,
            6 => util::channel_layout::ChannelLayout::_5POINT1,
            _ => util::channel_layout::ChannelLayout::STEREO,
        };
        let target_sample_rate = self.target_sample_rate;

        let resampler = match &mut self.resampler {
            Some(resampler) => resampler,
            resampler @ None => {
                debug!(
                    "🔧 初始化音频重采样器: {}Hz/{}ch → {}Hz/{}ch",
                    frame.rate(),
                    frame.channels(),
                    target_sample_rate,
                    self.target_channels
                );
                resampler.insert(software::resampling::Context::get(
                    frame.format(),
                    frame.channel_layout(),
                    frame.rate(),
                    util::format::Sample::F32(util::format::sample::Type::Packed),
                    target_layout,
                    target_sample_rate,
                )?)
            }
        };

        let mut resampled = util::frame::Audio::empty();
        resampler.run(frame, &mut resampled)?;

        let pts = frame
            .timestamp()
            .map(|ts| (ts as f64 * self.time_base * 1000.0) as i64)
            .unwrap_or(0);

        // 交错 f32：plane 0 的字节按 4 字节一组解释
        let sample_count = resampled.samples() * self.target_channels as usize;
        let bytes = resampled.data(0);
        let data = bytes
            .chunks_exact(4)
            .take(sample_count)
            .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        Ok(AudioFrame {
            pts,
            sample_rate: self.target_sample_rate,
            channels: self.target_channels,
            data,
        })
    }
}
