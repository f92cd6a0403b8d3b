//! Path eligibility filter.
//!
//! Pure function of the path string, applied identically at selection and
//! fetch time. Matching is case-insensitive throughout.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

/// Directory names whose subtrees are never summarized: VCS internals,
/// dependency dirs, virtualenvs, build output, caches, IDE metadata.
static SKIP_DIRS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        ".git",
        ".hg",
        ".svn",
        "node_modules",
        "bower_components",
        "vendor",
        "venv",
        ".venv",
        "env",
        "__pycache__",
        ".mypy_cache",
        ".pytest_cache",
        ".ruff_cache",
        ".tox",
        ".cache",
        "cache",
        "dist",
        "build",
        "out",
        "target",
        ".next",
        ".nuxt",
        ".output",
        "coverage",
        ".idea",
        ".vscode",
        ".vs",
        ".gradle",
        ".terraform",
        "pods",
        "htmlcov",
        ".eggs",
        ".nx",
        ".turbo",
    ]
    .into_iter()
    .collect()
});

/// Filename patterns for files that carry no summarizable signal: lock
/// files, minified bundles, source maps, binary media, compiled artifacts,
/// archives, databases, logs and editor temp files.
static SKIP_FILE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\.lock$",
        r"^(package-lock\.json|pnpm-lock\.yaml|go\.sum)$",
        r"\.min\.(js|css)$",
        r"\.map$",
        r"\.(png|jpe?g|gif|bmp|ico|svg|webp|tiff?)$",
        r"\.(woff2?|ttf|eot|otf)$",
        r"\.(mp3|mp4|avi|mov|wav|ogg|webm)$",
        r"\.(exe|dll|so|dylib|bin|o|a|obj|class|jar|war|pyc|pyd|wasm)$",
        r"\.(zip|tar|gz|tgz|bz2|xz|7z|rar)$",
        r"\.(db|sqlite3?|mdb)$",
        r"\.(log|tmp|temp|swp|bak)$",
        r"^\.ds_store$",
    ]
    .into_iter()
    .map(|p| Regex::new(p).expect("static skip pattern"))
    .collect()
});

/// Whether a repository path may be selected and fetched.
pub fn is_eligible(path: &str) -> bool {
    let path = path.trim_matches('/');
    if path.is_empty() {
        return false;
    }
    let segments: Vec<String> = path.split('/').map(str::to_lowercase).collect();
    let (filename, dirs) = match segments.split_last() {
        Some(split) => split,
        None => return false,
    };

    for dir in dirs {
        if SKIP_DIRS.contains(dir.as_str()) || dir.ends_with(".egg-info") {
            return false;
        }
    }
    if SKIP_DIRS.contains(filename.as_str()) {
        // A bare file named like a skip dir ("build", "out") is almost
        // always an artifact too.
        return false;
    }
    !SKIP_FILE_PATTERNS.iter().any(|re| re.is_match(filename))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_ordinary_source_files() {
        assert!(is_eligible("README.md"));
        assert!(is_eligible("src/main.rs"));
        assert!(is_eligible("docs/guide/intro.md"));
        assert!(is_eligible("Makefile"));
        assert!(is_eligible(".github/workflows/ci.yml"));
    }

    #[test]
    fn test_rejects_skip_directories_anywhere() {
        assert!(!is_eligible("node_modules/react/index.js"));
        assert!(!is_eligible("src/node_modules/x.js"));
        assert!(!is_eligible(".git/config"));
        assert!(!is_eligible("pkg/mylib.egg-info/PKG-INFO"));
        assert!(!is_eligible("build/output.txt"));
    }

    #[test]
    fn test_rejects_skip_filename_patterns() {
        assert!(!is_eligible("package-lock.json"));
        assert!(!is_eligible("assets/app.min.js"));
        assert!(!is_eligible("dist-info/app.js.map"));
        assert!(!is_eligible("logo.png"));
        assert!(!is_eligible("bin/tool.exe"));
        assert!(!is_eligible("backup.tar.gz"));
        assert!(!is_eligible("data.sqlite"));
        assert!(!is_eligible("server.log"));
    }

    #[test]
    fn test_rejects_any_lock_file() {
        // Lock files from ecosystems not enumerated by name.
        assert!(!is_eligible("flake.lock"));
        assert!(!is_eligible("uv.lock"));
        assert!(!is_eligible("ios/Podfile.lock"));
        assert!(!is_eligible("Cargo.lock"));
        assert!(!is_eligible("Gemfile.lock"));
    }

    #[test]
    fn test_rejects_tool_cache_directories() {
        assert!(!is_eligible("Pods/Alamofire/Source/Alamofire.swift"));
        assert!(!is_eligible("htmlcov/index.html"));
        assert!(!is_eligible(".eggs/setuptools/PKG-INFO"));
        assert!(!is_eligible(".nx/workspace-data/d.json"));
        assert!(!is_eligible(".turbo/turbo-build.log"));
    }

    #[test]
    fn test_case_insensitive() {
        assert!(!is_eligible("NODE_MODULES/pkg/index.js"));
        assert!(!is_eligible("Logo.PNG"));
        assert!(!is_eligible("YARN.LOCK"));
        assert!(is_eligible("SRC/Main.RS"));
    }

    #[test]
    fn test_rejects_empty_path() {
        assert!(!is_eligible(""));
        assert!(!is_eligible("/"));
    }

    #[test]
    fn test_purity() {
        // Same input, same answer, no state between calls.
        for _ in 0..3 {
            assert!(is_eligible("src/lib.rs"));
            assert!(!is_eligible("vendor/lib.rs"));
        }
    }
}
