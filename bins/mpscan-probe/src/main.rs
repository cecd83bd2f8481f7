//! mpscan-probe - MP3 结构探测工具
//!
//! 扫描一个或多个文件, 输出标签位置、帧链、比特率模式与时长.
//! 多个文件并行扫描, 各次扫描互不共享状态.

use anyhow::{Context, Result};
use clap::Parser;
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use mpscan::logging::{self, LoggingConfig};
use mpscan_format::mpeg::SubHeaderKind;
use mpscan_format::{BitrateMode, Discrepancy, LogObserver, Report, ScanOptions, TagInfo, TagKind};

/// mpscan MP3 结构探测工具
#[derive(Parser, Debug)]
#[command(name = "mpscan-probe", version, about = "MP3 标签与帧结构探测工具")]
struct Cli {
    /// 输入文件路径
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// 扫描选项 JSON 文件, 命令行参数在其之上覆盖
    #[arg(long)]
    config: Option<PathBuf>,

    /// 快速模式
    #[arg(long)]
    quick: bool,

    /// 不识别 ID3v2
    #[arg(long)]
    no_header_tag: bool,

    /// 不识别 ID3v1
    #[arg(long)]
    no_trailer_tag: bool,

    /// 帧链间隙桥接上限 (字节)
    #[arg(long)]
    max_gap: Option<u64>,

    /// 输出 JSON 格式
    #[arg(long)]
    json: bool,

    /// 把扫描事件写入日志
    #[arg(long)]
    trace_scan: bool,

    /// 日志目录
    #[arg(long, default_value = "logs")]
    log_dir: String,

    /// 提高文件日志级别 (-v debug, -vv trace)
    #[arg(short, action = clap::ArgAction::Count)]
    verbose: u8,

    /// 静默模式 (只输出探测结果)
    #[arg(short, long)]
    quiet: bool,
}

/// 单个文件的探测结果
#[derive(Serialize)]
struct ProbeOutput {
    filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<Report>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn main() {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("错误: {e:#}");
            process::exit(2);
        }
    }
}

/// 返回是否全部文件扫描成功
fn run(cli: &Cli) -> Result<bool> {
    let log_config = LoggingConfig {
        directory: cli.log_dir.clone(),
        file_prefix: "mpscan-probe".to_string(),
        console: !cli.quiet,
        ..LoggingConfig::default()
    }
    .with_verbosity(cli.verbose);
    logging::init(log_config)?;

    let options = build_options(cli)?;
    log::info!("扫描 {} 个文件, options={options:?}", cli.inputs.len());

    let outputs: Vec<ProbeOutput> = cli
        .inputs
        .par_iter()
        .map(|path| probe_one(path, options.clone()))
        .collect();
    let all_ok = outputs.iter().all(|o| o.error.is_none());

    if cli.json {
        let json = if outputs.len() == 1 {
            serde_json::to_string_pretty(&outputs[0])
        } else {
            serde_json::to_string_pretty(&outputs)
        }
        .context("序列化报告失败")?;
        println!("{json}");
    } else {
        for output in &outputs {
            print_text(output);
        }
    }
    Ok(all_ok)
}

fn build_options(cli: &Cli) -> Result<ScanOptions> {
    let mut options = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("读取配置失败, path={}", path.display()))?;
            serde_json::from_str::<ScanOptions>(&text)
                .with_context(|| format!("解析配置失败, path={}", path.display()))?
        }
        None => ScanOptions::default(),
    };
    if cli.quick {
        options.quick = true;
    }
    if cli.no_header_tag {
        options.header_tag = false;
    }
    if cli.no_trailer_tag {
        options.trailer_tag = false;
    }
    if cli.max_gap.is_some() {
        options.max_gap = cli.max_gap;
    }
    if cli.trace_scan {
        options = options.with_observer(Arc::new(LogObserver));
    }
    Ok(options)
}

fn probe_one(path: &Path, options: ScanOptions) -> ProbeOutput {
    let filename = path.display().to_string();
    match mpscan::scan_file(path, options) {
        Ok(report) => {
            log::debug!("{filename}: {} 帧", report.frame_count);
            ProbeOutput {
                filename,
                report: Some(report),
                error: None,
            }
        }
        Err(e) => {
            log::warn!("{filename}: 扫描失败: {e}");
            ProbeOutput {
                filename,
                report: None,
                error: Some(e.to_string()),
            }
        }
    }
}

/// 文本输出
fn print_text(output: &ProbeOutput) {
    println!("[FILE] {}", output.filename);
    if let Some(err) = &output.error {
        println!("  错误         : {err}");
        println!("[/FILE]");
        println!();
        return;
    }
    let Some(report) = &output.report else {
        return;
    };
    print_format_text(report);
    print_tags_text(report);
    print_declaration_text(report);
    println!("[/FILE]");
    println!();
}

fn print_format_text(report: &Report) {
    println!("[FORMAT]");
    println!("  文件大小     : {} 字节", report.size);
    println!("  帧数         : {}", report.frame_count);
    if let Some(frame) = &report.first_frame {
        println!("  版本/层      : {} {}", frame.version, frame.layer);
        println!("  采样率       : {} Hz", frame.sample_rate);
        println!("  声道         : {} ({})", frame.channels, frame.channel_mode);
    }
    match report.bitrate {
        Some(BitrateMode::Constant { bit_rate }) => {
            println!("  码率         : {} kbps (CBR)", bit_rate / 1000)
        }
        Some(BitrateMode::Variable { average }) => {
            println!("  码率         : {} kbps (VBR 平均)", average / 1000)
        }
        None => {}
    }
    if let (Some(start), Some(end)) = (report.audio_start, report.audio_end) {
        println!("  音频范围     : [{start}, {end})");
    }
    println!("  时长         : {:.3} 秒", report.duration_measured);
    if report.quick {
        println!("  快速模式     : 是 (时长按字节估算)");
    }
    println!("[/FORMAT]");
}

fn print_tags_text(report: &Report) {
    for tag in &report.tags {
        let name = match tag.kind {
            TagKind::VersionedHeader => "ID3v2",
            TagKind::LegacyTrailer => "ID3v1",
        };
        print!("[TAG {name}] [{}, {})", tag.start, tag.end);
        match &tag.info {
            TagInfo::VersionedHeader {
                major,
                revision,
                flags,
                ..
            } => println!(" v2.{major}.{revision} flags=0x{flags:02X}"),
            TagInfo::LegacyTrailer { track: Some(t), .. } => println!(" v1.1 track={t}"),
            TagInfo::LegacyTrailer { .. } => println!(),
        }
    }
}

fn print_declaration_text(report: &Report) {
    let Some(decl) = &report.declaration else {
        return;
    };
    let kind = match decl.sub_header.kind {
        SubHeaderKind::Xing => "Xing",
        SubHeaderKind::Info => "Info",
        SubHeaderKind::Vbri => "VBRI",
    };
    println!("[SUBHEADER {kind}] offset={}", decl.offset);
    if let Some(frames) = decl.sub_header.frames {
        println!("  声明帧数     : {frames}");
    }
    if let Some(bytes) = decl.sub_header.bytes {
        println!("  声明字节数   : {bytes}");
    }
    if let Some(dur) = report.duration_declared {
        println!("  声明时长     : {dur:.3} 秒");
    }
    if let Some(lame) = &decl.sub_header.lame {
        println!(
            "  编码器       : {} (delay={}, padding={})",
            lame.encoder, lame.encoder_delay, lame.encoder_padding
        );
    }
    for d in &report.discrepancies {
        match d {
            Discrepancy::FrameCount { declared, measured } => {
                println!("  不一致       : 帧数 声明={declared} 实测={measured}")
            }
            Discrepancy::ByteCount { declared, measured } => {
                println!("  不一致       : 字节数 声明={declared} 实测={measured}")
            }
        }
    }
    println!("[/SUBHEADER]");
}
