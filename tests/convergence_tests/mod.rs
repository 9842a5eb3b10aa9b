mod poisson_2d_mms;
