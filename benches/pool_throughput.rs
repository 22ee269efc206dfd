use std::convert::Infallible;
use std::hint::black_box;
use std::sync::Arc;
use std::thread;

use criterion::{Criterion, criterion_group, criterion_main};
use keyed_pool::{ConnectionInfo, Pool, PoolConfiguration, Poolable, ResourceId};

struct BenchConn {
    info: ConnectionInfo,
    id: ResourceId,
}

impl Poolable for BenchConn {
    type Descriptor = ConnectionInfo;
    type Error = Infallible;

    fn descriptor(&self) -> &ConnectionInfo {
        &self.info
    }

    fn unique_id(&self) -> ResourceId {
        self.id
    }

    fn acquire(&mut self) -> Result<(), Infallible> {
        Ok(())
    }

    fn release(&self) -> Result<(), Infallible> {
        Ok(())
    }
}

fn pool(max: usize) -> Pool<BenchConn> {
    let config = PoolConfiguration::new()
        .with_max_pool_size(max)
        .with_sleep_time_base(1)
        .with_max_attempts(1_000)
        .without_sweeper();
    Pool::<BenchConn>::new(
        |info: &ConnectionInfo| BenchConn {
            info: info.clone(),
            id: ResourceId::next(),
        },
        config,
    )
}

fn checkout_release(c: &mut Criterion) {
    let pool = pool(8);
    let info = ConnectionInfo::new("db-01", "lrm", "svc", "secret");

    c.bench_function("checkout_release_single_thread", |b| {
        b.iter(|| {
            let conn = pool.get_object(black_box(&info)).unwrap();
            pool.release_object(&conn).unwrap();
        })
    });

    c.bench_function("lease_single_thread", |b| {
        b.iter(|| {
            let conn = pool.lease(black_box(&info)).unwrap();
            black_box(conn.unique_id());
        })
    });
}

fn contended(c: &mut Criterion) {
    let pool = Arc::new(pool(4));
    let info = ConnectionInfo::new("db-01", "lrm", "svc", "secret");

    c.bench_function("checkout_release_4_threads", |b| {
        b.iter(|| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let pool = Arc::clone(&pool);
                    let info = info.clone();
                    thread::spawn(move || {
                        for _ in 0..100 {
                            let conn = pool.get_object(&info).unwrap();
                            pool.release_object(&conn).unwrap();
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }
        })
    });
}

criterion_group!(benches, checkout_release, contended);
criterion_main!(benches);
