mod client;

pub use client::{parse_repo_url, GithubClient, GithubClientConfig, RepositoryApi};
