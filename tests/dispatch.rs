//! End-to-end command scenarios driven through the dispatcher, the way a
//! worker or the serve loop would run them.

use std::path::Path;

use docdex::{
   command,
   dispatch::dispatch,
   handlers::{Dispatch, HandlerCtx},
   store::{RECORD_SIZE, RecordStore},
   wire::{Request, Response, TlvCursor},
};

struct Fixture {
   _dir:    tempfile::TempDir,
   store:   RecordStore,
   docroot: std::path::PathBuf,
}

impl Fixture {
   fn new() -> Self {
      let dir = tempfile::tempdir().unwrap();
      let docroot = dir.path().join("docs");
      std::fs::create_dir(&docroot).unwrap();
      let store = RecordStore::open(&dir.path().join("index.bin")).unwrap();
      Self { _dir: dir, store, docroot }
   }

   fn ctx(&self) -> HandlerCtx<'_> {
      HandlerCtx { store: &self.store, docroot: &self.docroot }
   }

   fn write_body(&self, name: &str, content: &[u8]) {
      std::fs::write(self.docroot.join(name), content).unwrap();
   }

   fn run(&self, flag: &str, tokens: &[&str]) -> docdex::Result<Dispatch> {
      let row = command::by_flag(flag).unwrap();
      let mut b = Request::builder(row.opcode);
      for (index, raw) in tokens.iter().enumerate() {
         row.types[index].encode(b.payload_mut(), raw).unwrap();
      }
      dispatch(&self.ctx(), &b.finish(), row)
   }

   fn reply(&self, flag: &str, tokens: &[&str]) -> Response {
      match self.run(flag, tokens).unwrap() {
         Dispatch::Reply(rsp) => rsp,
         Dispatch::Shutdown(_) => panic!("unexpected shutdown from {flag}"),
      }
   }
}

fn str_tlvs(rsp: &Response) -> Vec<String> {
   let mut cursor = TlvCursor::new(rsp.payload());
   let mut out = Vec::new();
   while let Some(tlv) = cursor.next().unwrap() {
      assert_eq!(tlv.ty, 1, "expected a string TLV");
      out.push(String::from_utf8_lossy(tlv.value).into_owned());
   }
   out
}

fn u32_tlv(rsp: &Response) -> u32 {
   let mut cursor = TlvCursor::new(rsp.payload());
   let tlv = cursor.next().unwrap().unwrap();
   assert_eq!(tlv.ty, 0, "expected a u32 TLV");
   assert!(cursor.next().unwrap().is_none());
   u32::from_le_bytes(tlv.value.try_into().unwrap())
}

#[test]
fn first_add_indexes_document_zero() {
   let fx = Fixture::new();
   let rsp = fx.reply("-a", &["T", "A", "2020", "p.txt"]);

   assert_eq!(str_tlvs(&rsp), vec!["Document 0 indexed"]);
   let store_len = std::fs::metadata(fx.store.path()).unwrap().len();
   assert_eq!(store_len, RECORD_SIZE as u64);
}

#[test]
fn consult_reports_all_four_fields() {
   let fx = Fixture::new();
   fx.reply("-a", &["T", "A", "2020", "p.txt"]);

   let lines = str_tlvs(&fx.reply("-c", &["0"]));
   assert_eq!(lines.len(), 4);
   assert!(lines[0].starts_with("Title: T"));
   assert!(lines[1].starts_with("Authors: A"));
   assert!(lines[2].starts_with("Year: 2020"));
   assert!(lines[3].starts_with("Path: p.txt"));
}

#[test]
fn consult_miss_still_replies_with_a_frame() {
   let fx = Fixture::new();
   let rsp = fx.reply("-c", &["9"]);
   assert_eq!(str_tlvs(&rsp), vec!["Document not found"]);
}

#[test]
fn delete_tombstones_and_reports_subsequent_misses() {
   let fx = Fixture::new();
   fx.reply("-a", &["T", "A", "2020", "p.txt"]);

   assert_eq!(
      str_tlvs(&fx.reply("-d", &["0"])),
      vec!["Index entry 0 deleted"]
   );
   assert_eq!(str_tlvs(&fx.reply("-c", &["0"])), vec!["Document not found"]);
   assert_eq!(
      str_tlvs(&fx.reply("-d", &["0"])),
      vec!["Index entry 0 not found"]
   );
}

#[test]
fn list_counts_lines_containing_the_keyword() {
   let fx = Fixture::new();
   fx.write_body("p.txt", b"foo\nfoo bar\nbaz\n");
   fx.reply("-a", &["T", "A", "2020", "p.txt"]);

   let rsp = fx.reply("-l", &["0", "foo"]);
   assert_eq!(u32_tlv(&rsp), 2);
}

#[test]
fn list_on_missing_document_replies_not_found() {
   let fx = Fixture::new();
   let rsp = fx.reply("-l", &["3", "foo"]);
   assert_eq!(str_tlvs(&rsp), vec!["Document not found"]);
}

#[test]
fn search_reports_live_matching_keys() {
   let fx = Fixture::new();
   fx.write_body("zero.txt", b"needle here\n");
   fx.write_body("one.txt", b"nothing\n");
   fx.write_body("two.txt", b"a needle again\n");
   fx.write_body("three.txt", b"needle but deleted\n");

   fx.reply("-a", &["Zero", "A", "2020", "zero.txt"]);
   fx.reply("-a", &["One", "A", "2020", "one.txt"]);
   fx.reply("-a", &["Two", "A", "2020", "two.txt"]);
   fx.reply("-a", &["Three", "A", "2020", "three.txt"]);
   fx.reply("-d", &["3"]);

   let rsp = fx.reply("-s", &["needle"]);
   assert_eq!(str_tlvs(&rsp), vec!["[0, 2]"]);
}

#[test]
fn search_result_is_independent_of_worker_count() {
   let fx = Fixture::new();
   for index in 0..12 {
      let name = format!("doc{index}.txt");
      let body = if index % 3 == 0 {
         b"carries the needle\n".to_vec()
      } else {
         b"plain text\n".to_vec()
      };
      fx.write_body(&name, &body);
      fx.reply("-a", &["T", "A", "2020", &name]);
   }

   let expected = str_tlvs(&fx.reply("-s", &["needle", "1"]));
   assert_eq!(expected, vec!["[0, 3, 6, 9]"]);
   for workers in ["2", "5", "16"] {
      let got = str_tlvs(&fx.reply("-s", &["needle", workers]));
      assert_eq!(got, expected, "worker count {workers} changed the result");
   }
}

#[test]
fn search_with_no_matches_reports_an_empty_list() {
   let fx = Fixture::new();
   fx.write_body("p.txt", b"nothing here\n");
   fx.reply("-a", &["T", "A", "2020", "p.txt"]);

   let rsp = fx.reply("-s", &["needle"]);
   assert_eq!(str_tlvs(&rsp), vec!["[]"]);
}

#[test]
fn search_on_an_empty_store_is_an_error() {
   let fx = Fixture::new();
   assert!(fx.run("-s", &["needle"]).is_err());
}

#[test]
fn search_skips_unreadable_bodies() {
   let fx = Fixture::new();
   fx.write_body("ok.txt", b"needle\n");
   fx.reply("-a", &["Ok", "A", "2020", "ok.txt"]);
   // Indexed but the body never existed on disk.
   fx.reply("-a", &["Ghost", "A", "2020", "ghost.txt"]);

   let rsp = fx.reply("-s", &["needle", "4"]);
   assert_eq!(str_tlvs(&rsp), vec!["[0]"]);
}

#[test]
fn flush_replies_then_signals_shutdown() {
   let fx = Fixture::new();
   match fx.run("-f", &[]).unwrap() {
      Dispatch::Shutdown(rsp) => {
         assert_eq!(str_tlvs(&rsp), vec!["Server is shutting down"]);
      },
      Dispatch::Reply(_) => panic!("flush must signal shutdown"),
   }
}

#[test]
fn add_truncates_oversized_fields() {
   let fx = Fixture::new();
   let long_title = "t".repeat(300);
   let long_path = "p".repeat(100);
   fx.reply("-a", &[&long_title, "A", "2020", &long_path]);

   let lines = str_tlvs(&fx.reply("-c", &["0"]));
   assert_eq!(lines[0], format!("Title: {}", "t".repeat(199)));
   assert_eq!(lines[3], format!("Path: {}", "p".repeat(63)));
}

#[test]
fn dispatch_rejects_malformed_argument_lists() {
   let fx = Fixture::new();
   let row = command::by_flag("-c").unwrap();

   // Consult with a string where a u32 is required.
   let mut b = Request::builder(row.opcode);
   docdex::args::ArgType::Str.encode(b.payload_mut(), "zero").unwrap();
   assert!(dispatch(&fx.ctx(), &b.finish(), row).is_err());

   // Add with too few arguments.
   let row = command::by_flag("-a").unwrap();
   let mut b = Request::builder(row.opcode);
   docdex::args::ArgType::Str.encode(b.payload_mut(), "T").unwrap();
   assert!(dispatch(&fx.ctx(), &b.finish(), row).is_err());
}

#[test]
fn bodies_resolve_under_the_document_root() {
   let fx = Fixture::new();
   std::fs::create_dir(fx.docroot.join("sub")).unwrap();
   fx.write_body("sub/inner.txt", b"needle\n");
   fx.reply("-a", &["T", "A", "2020", "sub/inner.txt"]);

   let rsp = fx.reply("-l", &["0", "needle"]);
   assert_eq!(u32_tlv(&rsp), 1);
   assert!(
      Path::new(&fx.docroot).join("sub/inner.txt").exists(),
      "fixture body should live under the docroot"
   );
}
