//! 集成测试共用的合成流构造.

#![allow(dead_code)]

/// MPEG-1 Layer III, 128kbps, 44100Hz, 立体声, 无 CRC
pub const FRAME_HEADER: [u8; 4] = [0xFF, 0xFB, 0x90, 0x00];

/// 上述格式的帧长
pub const FRAME_LEN: usize = 417;

/// 单帧时长 (秒)
pub const FRAME_DURATION: f64 = 1152.0 / 44100.0;

/// 负载全零的音频帧
pub fn frame() -> Vec<u8> {
    let mut f = vec![0u8; FRAME_LEN];
    f[..4].copy_from_slice(&FRAME_HEADER);
    f
}

/// 带 Xing 子头 (帧数 + 字节数) 的首帧
pub fn xing_frame(frames: u32, bytes: u32) -> Vec<u8> {
    let mut f = frame();
    f[36..40].copy_from_slice(b"Xing");
    f[40..44].copy_from_slice(&3u32.to_be_bytes());
    f[44..48].copy_from_slice(&frames.to_be_bytes());
    f[48..52].copy_from_slice(&bytes.to_be_bytes());
    f
}

/// ID3v2.3 标签, 标签体全零
pub fn id3v2(body: usize) -> Vec<u8> {
    let mut v = b"ID3\x03\x00\x00".to_vec();
    let size = mpscan::core::syncsafe::encode(body as u32).unwrap();
    v.extend_from_slice(&size);
    v.resize(10 + body, 0);
    v
}

/// ID3v1 标签
pub fn id3v1() -> Vec<u8> {
    let mut v = vec![0u8; 128];
    v[..3].copy_from_slice(b"TAG");
    v[3..12].copy_from_slice(b"Test Song");
    v
}

/// 头部标签 + n 帧 + 尾部标签
pub fn tagged_stream(tag_body: usize, frames: usize) -> Vec<u8> {
    let mut data = id3v2(tag_body);
    for _ in 0..frames {
        data.extend_from_slice(&frame());
    }
    data.extend_from_slice(&id3v1());
    data
}
