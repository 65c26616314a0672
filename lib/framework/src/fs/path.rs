use std::path::Path;

pub trait PathExt {
    fn is_compressible_fits(&self) -> bool;
}

impl PathExt for Path {
    // pipeline gzips fits files after the fact, so an uncompressed name may have become name.gz
    fn is_compressible_fits(&self) -> bool {
        let path = self.to_string_lossy();
        path.contains(".fits") && !path.contains(".gz")
    }
}
