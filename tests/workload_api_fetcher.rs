//! These tests require a running SPIRE server and agent with workloads registered
//! and `SPIFFE_ENDPOINT_SOCKET` pointing at the agent socket.

#[cfg(feature = "integration-tests")]
mod integration_tests_workload_api_fetcher {
    use std::time::Duration;
    use vault_auth_spiffe::{JwtFetcher, SpiffeAuthMethod, WorkloadApiFetcher};

    #[tokio::test]
    #[ignore = "requires running SPIFFE Workload API"]
    async fn fetch_jwt_token() {
        let fetcher = WorkloadApiFetcher::new();
        let token = fetcher
            .fetch_jwt(&["my_audience".to_owned()])
            .await
            .expect("Failed to fetch JWT token");
        assert_eq!(token.split('.').count(), 3);
    }

    #[tokio::test]
    #[ignore = "requires running SPIFFE Workload API"]
    async fn authenticate_with_fetched_token() {
        let method = SpiffeAuthMethod::builder()
            .role("my-role")
            .audience("my_audience")
            .mount_path("spiffe")
            .build()
            .await
            .expect("Failed to create auth method");

        let request = tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                if let Ok(request) = method.authenticate() {
                    return request;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await
        .expect("No JWT-SVID fetched");

        assert_eq!(request.path, "spiffe/login");
        assert!(request.data.get("jwt").is_some());
        method.shutdown().await;
    }
}
