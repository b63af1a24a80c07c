use std::thread;

use seria::SerialExecutor;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let say_hello = || println!("Hello, {:?}", thread::current().id());

    let t = thread::spawn(say_hello);
    say_hello();
    t.join().expect("hello thread panicked");

    // The same closure, handed to a serial executor, always runs on its
    // worker thread.
    let exec = SerialExecutor::builder().name("hello-worker").spawn(())?;
    exec.execute(move |_| say_hello())?;
    exec.shutdown()?;

    Ok(())
}
