// cargo r --example chibicheck -- 'drawings/**/*.chi'
use log::{info, error, trace};
use chibi::{DecodeOptions, Document, EncodeOptions, Node, Result};

fn display_tree(doc: &Document) -> String {
    let mut layers = 0;
    let mut groups = 0;
    let mut masks = 0;
    for node in doc.nodes() {
        match node {
            Node::Layer(_) => layers += 1,
            Node::Group(_) => groups += 1,
        }
        if node.mask().is_some() { masks += 1; }
    }
    format!("{}x{}: {} layers, {} groups, {} masks", doc.width, doc.height, layers, groups, masks)
}

fn display_result(r: &Result<Document>) -> String {
    match r {
        Ok(doc) => display_tree(doc),
        Err(e) => e.to_string(),
    }
}

pub fn main() {
    dotenv::dotenv().ok();
    env_logger::init();

    let pattern = std::env::args().nth(1).unwrap();
    let options = DecodeOptions::default();

    for entry in glob::glob(&pattern).expect("Fail to read glob pattern") {
        let fpath = &entry.expect("entry list failed");
        trace!("check... {}", fpath.display());

        let doc1 = chibi::load(fpath, &options);
        let doc2 = doc1.as_ref()
            .map_err(|e| chibi::Error::internal(e.to_string()))
            .and_then(|doc| chibi::encode(doc, &EncodeOptions::export()))
            .and_then(|bytes| chibi::decode(&bytes, &options));

        match (&doc1, &doc2) {
            (Ok(d1), Ok(d2)) => {
                if d1 == d2 {
                    info!("EQ {}: {}", fpath.display(), display_result(&doc1));
                } else {
                    error!("NE {}:\n\t(file){}\n\t(again){}", fpath.display(), display_result(&doc1), display_result(&doc2));
                }
            },
            (Err(e), _) => {
                error!("FAIL {}: {}", fpath.display(), e);
            },
            (Ok(_), Err(e)) => {
                error!("NE {}: re-encoded file does not decode: {}", fpath.display(), e);
            },
        };
    }
}
