//! End-to-end tests for the `askdocs` binary.
//!
//! None of these reach the network: they cover extraction, argument
//! handling and the failure paths that must stop before a model call.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn askdocs_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_askdocs"))
}

/// Run the binary with an isolated config path and no credentials unless
/// `env` provides them.
fn run_askdocs(root: &Path, args: &[&str], env: &[(&str, &str)]) -> (String, String, i32) {
    let binary = askdocs_binary();
    let mut cmd = Command::new(&binary);
    cmd.arg("--config")
        .arg(root.join("config/askdocs.toml"))
        .arg("--progress")
        .arg("off")
        .args(args)
        .env_remove("GOOGLE_API_KEY")
        .env_remove("RUST_LOG");
    for (k, v) in env {
        cmd.env(k, v);
    }
    let output = cmd
        .output()
        .unwrap_or_else(|e| panic!("Failed to run askdocs binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.code().unwrap_or(-1))
}

/// Minimal PDF whose single page draws `phrase`. Offsets in the xref
/// table are computed so the parser accepts it.
fn minimal_pdf(phrase: &str) -> Vec<u8> {
    let content = format!("BT /F1 12 Tf 100 700 Td ({}) Tj ET", phrase);
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    out.extend_from_slice(
        format!(
            "4 0 obj << /Length {} >> stream\n{}\nendstream endobj\n",
            content.len(),
            content
        )
        .as_bytes(),
    );
    let o5 = out.len();
    out.extend_from_slice(
        b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in [o1, o2, o3, o4, o5] {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

fn minimal_docx(paragraphs: &[&str]) -> Vec<u8> {
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
        .collect();
    let xml = format!(
        "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
        body
    );
    zip_bytes(&[("word/document.xml", xml.as_bytes())])
}

fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        for (name, body) in entries {
            zip.start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(body).unwrap();
        }
        zip.finish().unwrap();
    }
    buf
}

fn setup() -> TempDir {
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join("config")).unwrap();
    fs::create_dir_all(tmp.path().join("files")).unwrap();
    tmp
}

#[test]
fn extract_files_keeps_argument_order() {
    let tmp = setup();
    let files = tmp.path().join("files");
    fs::write(files.join("b.txt"), "second file").unwrap();
    fs::write(files.join("a.csv"), "col1,col2\n1,2").unwrap();
    fs::write(files.join("memo.docx"), minimal_docx(&["Memo title", "Body"])).unwrap();

    let b = files.join("b.txt");
    let a = files.join("a.csv");
    let memo = files.join("memo.docx");
    let (stdout, stderr, code) = run_askdocs(
        tmp.path(),
        &[
            "extract",
            "--files",
            b.to_str().unwrap(),
            a.to_str().unwrap(),
            memo.to_str().unwrap(),
        ],
        &[],
    );
    assert_eq!(code, 0, "stderr: {}", stderr);
    assert!(stdout.contains("files: 3  failed: 0  skipped: 0"));
    assert!(stdout.contains("chunks: 1"));
    assert!(stdout.ends_with("second file\ncol1,col2\n1,2\nMemo title\nBody\n"));
}

#[test]
fn extract_reads_pdf() {
    let tmp = setup();
    let pdf = tmp.path().join("files/report.pdf");
    fs::write(&pdf, minimal_pdf("quarterly revenue")).unwrap();

    let (stdout, stderr, code) =
        run_askdocs(tmp.path(), &["extract", "--files", pdf.to_str().unwrap()], &[]);
    assert_eq!(code, 0, "stderr: {}", stderr);
    assert!(stdout.contains("quarterly revenue"), "stdout: {}", stdout);
    assert!(!stdout.contains("[PDF error"));
}

#[test]
fn extract_zip_with_corrupt_pdf_keeps_going() {
    let tmp = setup();
    let archive = tmp.path().join("files/batch.zip");
    fs::write(
        &archive,
        zip_bytes(&[
            ("docs/broken.pdf", &b"%PDF-1.4 this is not really a pdf"[..]),
            ("docs/notes.txt", &b"Revenue: 100\nCost: 40"[..]),
        ]),
    )
    .unwrap();

    let (stdout, stderr, code) =
        run_askdocs(tmp.path(), &["extract", "--zip", archive.to_str().unwrap()], &[]);
    assert_eq!(code, 0, "stderr: {}", stderr);
    assert!(stdout.contains("[PDF error broken.pdf:"));
    assert!(stdout.contains("Revenue: 100\nCost: 40"));
    assert!(stdout.contains("failed: 1"));
}

#[test]
fn extract_quiet_omits_corpus() {
    let tmp = setup();
    let file = tmp.path().join("files/secret.txt");
    fs::write(&file, "do not print me").unwrap();

    let (stdout, _, code) = run_askdocs(
        tmp.path(),
        &["extract", "--quiet", "--files", file.to_str().unwrap()],
        &[],
    );
    assert_eq!(code, 0);
    assert!(stdout.contains("secret.txt"));
    assert!(!stdout.contains("do not print me"));
}

#[test]
fn extract_corrupt_archive_fails() {
    let tmp = setup();
    let archive = tmp.path().join("files/bad.zip");
    fs::write(&archive, &b"definitely not a zip"[..]).unwrap();

    let (_, stderr, code) =
        run_askdocs(tmp.path(), &["extract", "--zip", archive.to_str().unwrap()], &[]);
    assert_eq!(code, 1);
    assert!(stderr.contains("could not read archive"), "stderr: {}", stderr);
}

#[test]
fn sources_are_mutually_exclusive() {
    let tmp = setup();
    let file = tmp.path().join("files/a.txt");
    fs::write(&file, "a").unwrap();
    let (_, _, code) = run_askdocs(
        tmp.path(),
        &[
            "extract",
            "--files",
            file.to_str().unwrap(),
            "--zip",
            "x.zip",
        ],
        &[],
    );
    assert_ne!(code, 0);

    let (_, _, code) = run_askdocs(tmp.path(), &["extract"], &[]);
    assert_ne!(code, 0);
}

#[test]
fn ask_without_credential_fails_fast() {
    let tmp = setup();
    let file = tmp.path().join("files/a.txt");
    fs::write(&file, "Revenue: 100").unwrap();

    let (stdout, stderr, code) = run_askdocs(
        tmp.path(),
        &["ask", "--files", file.to_str().unwrap(), "--question", "Profit?"],
        &[],
    );
    assert_eq!(code, 1);
    assert!(stdout.is_empty());
    assert!(stderr.contains("Missing GOOGLE_API_KEY"), "stderr: {}", stderr);
}

#[test]
fn ask_with_invalid_folder_aborts_before_model_call() {
    let tmp = setup();
    // Point both endpoints at a closed port: any request would fail with a
    // transport error rather than the acquisition message checked below.
    fs::write(
        tmp.path().join("config/askdocs.toml"),
        "[model]\nendpoint = \"http://127.0.0.1:9\"\n\n[drive]\nendpoint = \"http://127.0.0.1:9\"\n",
    )
    .unwrap();

    let (stdout, stderr, code) = run_askdocs(
        tmp.path(),
        &["ask", "--folder", "not a folder!", "--question", "Anything?"],
        &[("GOOGLE_API_KEY", "test-key")],
    );
    assert_eq!(code, 1);
    assert!(stdout.is_empty());
    assert!(
        stderr.contains("could not sync remote folder"),
        "stderr: {}",
        stderr
    );
}

#[test]
fn invalid_config_is_rejected() {
    let tmp = setup();
    fs::write(
        tmp.path().join("config/askdocs.toml"),
        "[chunking]\nchunk_size = 100\nchunk_overlap = 100\n",
    )
    .unwrap();
    let file = tmp.path().join("files/a.txt");
    fs::write(&file, "a").unwrap();

    let (_, stderr, code) =
        run_askdocs(tmp.path(), &["extract", "--files", file.to_str().unwrap()], &[]);
    assert_eq!(code, 1);
    assert!(stderr.contains("chunk_overlap"), "stderr: {}", stderr);
}

#[test]
fn formats_lists_every_extension() {
    let tmp = setup();
    let (stdout, _, code) = run_askdocs(tmp.path(), &["formats"], &[]);
    assert_eq!(code, 0);
    for ext in [".pdf", ".docx", ".xlsx", ".pptx", ".txt", ".csv", ".zip"] {
        assert!(stdout.contains(ext), "missing {} in {}", ext, stdout);
    }
}

#[test]
fn formats_does_not_read_config() {
    let tmp = setup();
    fs::write(tmp.path().join("config/askdocs.toml"), "[chunking\nbroken").unwrap();
    let (stdout, stderr, code) = run_askdocs(tmp.path(), &["formats"], &[]);
    assert_eq!(code, 0, "stderr: {}", stderr);
    assert!(stdout.contains(".xlsx"));
}
