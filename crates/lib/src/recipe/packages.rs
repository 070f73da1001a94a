//! Recipes shipped with the crate.

use crate::error::ConfigError;
use crate::recipe::{BuildCtx, Package, Recipe, RecipeSet};

const LOCALOPTIONS_H: &str = "\
#define DEBUG_TRACE 1
#define DEBUG_NOFORK 1
";

/// Static musl toolchain wrapper (`musl-gcc`) used by the other recipes.
pub struct MuslTools;

impl Package for MuslTools {
  fn descriptor(&self) -> Recipe {
    let version = "1.2.2";
    Recipe::new("musl-tools", version)
      .with_source_url(&format!("https://musl.libc.org/releases/musl-{version}.tar.gz"))
      .with_file("/usr/bin/musl-gcc", "destdir/usr/bin/musl-gcc")
      .with_file("/usr/lib/musl/lib/musl-gcc.specs", "destdir/usr/lib/musl/lib/musl-gcc.specs")
      .with_file("/usr/lib/musl/lib/libc.a", "destdir/usr/lib/musl/lib/libc.a")
  }

  fn build(&self, ctx: &mut BuildCtx) {
    ctx.run("./configure --prefix=/usr/lib/musl --exec-prefix=/usr --disable-shared");
    ctx.make();
    ctx.make_args("install DESTDIR=\"$PWD/destdir\"");
  }
}

/// Dropbear SSH server, statically linked against musl.
pub struct Dropbear;

impl Package for Dropbear {
  fn descriptor(&self) -> Recipe {
    let version = "2020.81";
    Recipe::new("dropbear", version)
      .with_source_url(&format!(
        "https://matt.ucc.asn.au/dropbear/releases/dropbear-{version}.tar.bz2"
      ))
      .with_host_dep("musl-tools")
      .with_file("/bin/dropbear", "dropbear")
      .with_file("/bin/dropbearkey", "dropbearkey")
  }

  fn build(&self, ctx: &mut BuildCtx) {
    ctx.add_file("localoptions.h", LOCALOPTIONS_H);
    ctx.run("./configure CC=musl-gcc --enable-static --disable-largefile --disable-zlib --disable-syslog");
    ctx.make();
  }
}

/// The built-in recipe set, in registration order.
pub fn builtin() -> Result<RecipeSet, ConfigError> {
  RecipeSet::from_packages([&MuslTools as &dyn Package, &Dropbear])
}
